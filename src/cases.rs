//! YAML test case loading and validation.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

use testwright_core_types::TestCase;

/// Load a single test case definition from a YAML file.
pub fn load_case(path: &Path) -> Result<TestCase> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading case file {}", path.display()))?;
    let case: TestCase = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing case file {}", path.display()))?;
    validate(&case).with_context(|| format!("invalid case file {}", path.display()))?;
    Ok(case)
}

/// Load every `.yaml`/`.yml` file in a directory as a test case.
pub fn load_dir(dir: &Path) -> Result<Vec<TestCase>> {
    let mut cases = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading cases directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false);
        if is_yaml {
            cases.push(load_case(&path)?);
        }
    }
    Ok(cases)
}

fn validate(case: &TestCase) -> Result<()> {
    if case.name.trim().is_empty() {
        anyhow::bail!("case name is empty");
    }
    if case.url.trim().is_empty() {
        anyhow::bail!("case url is empty");
    }
    if case.steps.is_empty() {
        anyhow::bail!("case has no steps");
    }
    let mut orders = HashSet::new();
    for step in &case.steps {
        if step.instruction.trim().is_empty() {
            anyhow::bail!("step {} has an empty instruction", step.order);
        }
        if !orders.insert(step.order) {
            anyhow::bail!("duplicate step order {}", step.order);
        }
    }
    Ok(())
}
