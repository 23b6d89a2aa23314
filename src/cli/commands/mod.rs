//! CLI command implementations.

pub mod copy;
pub mod init;
pub mod process;
pub mod task;

use anyhow::{bail, Result};

use crate::domain::models::{VariableMap, VariableValue};

/// Parse `name=value` pairs. Values are read as JSON when they parse, else as strings.
pub fn parse_variables(pairs: &[String]) -> Result<VariableMap> {
    let mut variables = VariableMap::new();
    for pair in pairs {
        let Some((name, raw)) = pair.split_once('=') else {
            bail!("Invalid variable '{pair}', expected name=value");
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("Invalid variable '{pair}', name is empty");
        }
        let value = serde_json::from_str(raw)
            .map(VariableValue::from_json)
            .unwrap_or_else(|_| VariableValue::String(raw.to_string()));
        variables.insert(name.to_string(), value);
    }
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variables() {
        let vars = parse_variables(&[
            "approved=true".into(),
            "days=3".into(),
            "reviewers=[\"kermit\",\"piggy\"]".into(),
            "note=see you".into(),
        ])
        .unwrap();
        assert_eq!(vars["approved"], VariableValue::Boolean(true));
        assert_eq!(vars["days"], VariableValue::Integer(3));
        assert_eq!(vars["reviewers"].elements().len(), 2);
        assert_eq!(vars["note"], VariableValue::String("see you".into()));
        assert!(parse_variables(&["oops".into()]).is_err());
    }
}
