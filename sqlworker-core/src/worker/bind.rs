//! Parameter binding for `run`.

use sqlworker_db::Statement;

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::BindParams;
use crate::value::Value;

/// How a single parameter is handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindValue<'a> {
    Null,
    Int(i32),
    Int64(i64),
    Double(f64),
    Text(&'a str),
    Blob(&'a [u8]),
}

/// Picks the engine binding for `value`.
///
/// Integers that fit 32 bits bind as `int`, larger ones as `int64`. Booleans
/// bind as 0 or 1.
///
/// # Errors
///
/// [`BridgeError::UnsupportedParameterType`] for errors, arrays and objects.
pub fn coerce(value: &Value) -> BridgeResult<BindValue<'_>> {
    Ok(match value {
        Value::Null => BindValue::Null,
        Value::Integer(v) => i32::try_from(*v).map_or(BindValue::Int64(*v), BindValue::Int),
        Value::Float(v) => BindValue::Double(*v),
        Value::Text(v) => BindValue::Text(v),
        Value::Bytes(v) => BindValue::Blob(v),
        Value::Bool(v) => BindValue::Int(i32::from(*v)),
        other @ (Value::Error(_) | Value::Array(_) | Value::Object(_)) => {
            return Err(BridgeError::UnsupportedParameterType(
                other.type_name().to_string(),
            ))
        }
    })
}

/// 1-based parameter index for `key`, or 0 when the statement has no such
/// parameter (the value is then skipped).
///
/// Positional keys are 0-based decimal positions.
///
/// # Errors
///
/// [`BridgeError::InvalidBindParameter`] for a positional key that is not a
/// number.
pub fn parameter_index(statement: &Statement, key: &str, positional: bool) -> BridgeResult<i32> {
    if positional {
        let position: i64 = key
            .trim()
            .parse()
            .map_err(|_| BridgeError::InvalidBindParameter(key.to_string()))?;
        return Ok(i32::try_from(position + 1).unwrap_or(0).max(0));
    }
    Ok(statement.parameter_index(key)?.unwrap_or(0))
}

/// Binds every parameter of `params` to `statement`.
///
/// # Errors
///
/// Coercion and index errors from [`coerce`] and [`parameter_index`], or the
/// engine's bind error.
pub fn bind_params(statement: &Statement, params: &BindParams) -> BridgeResult<()> {
    for (key, value) in params.entries() {
        let index = parameter_index(statement, key, params.is_positional())?;
        if index > 0 {
            bind_value(statement, index, coerce(value)?)?;
        }
    }
    Ok(())
}

fn bind_value(statement: &Statement, index: i32, value: BindValue<'_>) -> BridgeResult<()> {
    match value {
        BindValue::Null => statement.bind_null(index)?,
        BindValue::Int(v) => statement.bind_int(index, v)?,
        BindValue::Int64(v) => statement.bind_int64(index, v)?,
        BindValue::Double(v) => statement.bind_double(index, v)?,
        BindValue::Text(v) => statement.bind_text(index, v)?,
        BindValue::Blob(v) => statement.bind_blob(index, v)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlworker_db::{Connection, StepResult};
    use test_case::test_case;

    use super::*;

    #[test_case(Value::Integer(2_147_483_647), BindValue::Int(2_147_483_647) ; "i32 max")]
    #[test_case(Value::Integer(2_147_483_648), BindValue::Int64(2_147_483_648) ; "above i32")]
    #[test_case(Value::Integer(-2_147_483_649), BindValue::Int64(-2_147_483_649) ; "below i32")]
    #[test_case(Value::Float(3.14), BindValue::Double(3.14) ; "float")]
    #[test_case(Value::Bool(true), BindValue::Int(1) ; "true")]
    #[test_case(Value::Bool(false), BindValue::Int(0) ; "false")]
    #[test_case(Value::Null, BindValue::Null ; "null")]
    fn test_coerce(value: Value, expected: BindValue<'static>) {
        assert_eq!(coerce(&value).expect("coerce"), expected);
    }

    #[test]
    fn test_coerce_borrowed_kinds() {
        let bytes = Value::Bytes(vec![1, 2]);
        assert_eq!(coerce(&bytes).expect("coerce"), BindValue::Blob(&[1, 2]));
        let text = Value::from("hi");
        assert_eq!(coerce(&text).expect("coerce"), BindValue::Text("hi"));
    }

    #[test]
    fn test_unsupported_parameter_type() {
        let err = coerce(&Value::object([("a", 1)])).expect_err("object");
        assert_eq!(err.to_string(), "Unsupported parameter type: object");
    }

    #[test]
    fn test_bound_values_keep_their_storage_class() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        let stmt = conn
            .prepare("SELECT typeof(?1), typeof(?2), typeof(?3), ?1")
            .expect("prepare");
        let params = BindParams::positional([
            Value::Integer(2_147_483_648),
            Value::Float(3.14),
            Value::Bytes(vec![7]),
        ]);
        bind_params(&stmt, &params).expect("bind");
        assert_eq!(stmt.step().expect("step"), StepResult::Row);
        let row: Vec<Value> = stmt
            .column_values()
            .expect("columns")
            .into_iter()
            .map(Value::from)
            .collect();
        assert_eq!(
            row,
            vec![
                Value::from("integer"),
                Value::from("real"),
                Value::from("blob"),
                Value::Integer(2_147_483_648),
            ]
        );
    }

    #[test]
    fn test_named_parameters_skip_unknown_names() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        let stmt = conn.prepare("SELECT $a").expect("prepare");
        let params = BindParams::named([("$a", Value::from("x")), ("$missing", Value::from("y"))]);
        bind_params(&stmt, &params).expect("bind");
        stmt.step().expect("step");
        assert_eq!(
            stmt.column_value(0).expect("value"),
            sqlworker_db::Value::Text("x".to_string())
        );
    }

    #[test]
    fn test_non_numeric_positional_key() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        let stmt = conn.prepare("SELECT ?").expect("prepare");
        let err = parameter_index(&stmt, "first", true).expect_err("invalid");
        assert!(matches!(err, BridgeError::InvalidBindParameter(key) if key == "first"));
        assert_eq!(parameter_index(&stmt, "0", true).expect("index"), 1);
    }
}
