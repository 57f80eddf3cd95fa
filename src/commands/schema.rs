use crate::commands::Out;
use crate::model::ValidatedRecord;
use crate::Result;
use schemars::Schema;

/// Prints the JSON schema of a validated expense record, the shape every command outputs.
pub fn schema() -> Result<Out<Schema>> {
    Ok(Out::new(
        "JSON schema of a validated expense",
        schemars::schema_for!(ValidatedRecord),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lists_fields() {
        let out = schema().unwrap();
        let json = serde_json::to_value(out.structure().unwrap()).unwrap();
        let properties = json["properties"].as_object().unwrap();
        for field in ["amount", "category", "description", "date"] {
            assert!(properties.contains_key(field), "missing {field}");
        }
    }
}
