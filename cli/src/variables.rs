use interpreter::{RuntimeValue, Scope};

/// Convert a TOML table into template variables.
///
/// Datetimes become their TOML text. Tables have no runtime counterpart and are
/// rejected.
pub fn scope_from_table(table: &toml::Table) -> Result<Scope, String> {
    table
        .iter()
        .map(|(name, value)| Ok((name.clone(), to_runtime(name, value)?)))
        .collect()
}

/// Read and convert a TOML variables file.
pub fn load(path: &str) -> Result<Scope, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path, e))?;
    let table: toml::Table = toml::from_str(&text).map_err(|e| format!("{}: {}", path, e))?;
    scope_from_table(&table)
}

fn to_runtime(name: &str, value: &toml::Value) -> Result<RuntimeValue, String> {
    Ok(match value {
        toml::Value::Integer(n) => RuntimeValue::Integer(*n),
        toml::Value::Float(f) => RuntimeValue::Float(*f),
        toml::Value::Boolean(b) => RuntimeValue::Boolean(*b),
        toml::Value::String(s) => RuntimeValue::String(s.clone()),
        toml::Value::Datetime(d) => RuntimeValue::String(d.to_string()),
        toml::Value::Array(items) => RuntimeValue::List(
            items
                .iter()
                .map(|item| to_runtime(name, item))
                .collect::<Result<_, _>>()?,
        ),
        toml::Value::Table(_) => {
            return Err(format!("variable '{}': tables are not supported", name));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn converts_scalars_and_arrays() {
        let table: toml::Table = toml::from_str(
            r#"
            count = 3
            ratio = 0.5
            ok = true
            name = "Saturn"
            targets = ["a", "b"]
            when = 2024-01-02
            "#,
        )
        .unwrap();
        let scope = scope_from_table(&table).unwrap();

        assert_eq!(scope["count"], RuntimeValue::Integer(3));
        assert_eq!(scope["ratio"], RuntimeValue::Float(0.5));
        assert_eq!(scope["ok"], RuntimeValue::Boolean(true));
        assert_eq!(scope["name"], RuntimeValue::String("Saturn".into()));
        assert_eq!(scope["targets"], RuntimeValue::from(vec!["a", "b"]));
        assert_eq!(scope["when"], RuntimeValue::String("2024-01-02".into()));
    }

    #[test]
    fn rejects_tables() {
        let table: toml::Table = toml::from_str("[nested]\nx = 1\n").unwrap();
        let err = scope_from_table(&table).unwrap_err();
        assert!(err.contains("nested"), "{err}");

        let table: toml::Table = toml::from_str("rows = [{ x = 1 }]\n").unwrap();
        assert!(scope_from_table(&table).is_err());
    }
}
