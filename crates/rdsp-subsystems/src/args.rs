//! Small helpers for pulling typed positional arguments out of a decoded
//! packet, shared across subsystem handlers so each one doesn't re-derive
//! its own bounds-checked accessor.

use rdsp_wire::Value;

#[derive(Debug, thiserror::Error)]
pub enum ArgError {
    #[error("missing argument {index} ({name})")]
    Missing { index: usize, name: &'static str },
    #[error("argument {index} ({name}) has the wrong type")]
    WrongType { index: usize, name: &'static str },
}

pub fn str_arg<'a>(args: &'a [Value], index: usize, name: &'static str) -> Result<&'a str, ArgError> {
    args.get(index)
        .ok_or(ArgError::Missing { index, name })?
        .as_str()
        .ok_or(ArgError::WrongType { index, name })
}

pub fn int_arg(args: &[Value], index: usize, name: &'static str) -> Result<i64, ArgError> {
    args.get(index)
        .ok_or(ArgError::Missing { index, name })?
        .as_int()
        .ok_or(ArgError::WrongType { index, name })
}

pub fn bool_arg(args: &[Value], index: usize, name: &'static str) -> Result<bool, ArgError> {
    args.get(index)
        .ok_or(ArgError::Missing { index, name })?
        .as_bool()
        .ok_or(ArgError::WrongType { index, name })
}

pub fn opt_arg(args: &[Value], index: usize) -> Option<&Value> {
    args.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_argument_is_reported_with_its_name() {
        let args: Vec<Value> = vec![];
        assert!(matches!(
            str_arg(&args, 0, "target"),
            Err(ArgError::Missing { name: "target", .. })
        ));
    }

    #[test]
    fn wrong_type_is_reported() {
        let args = vec![Value::Int(1)];
        assert!(matches!(
            str_arg(&args, 0, "target"),
            Err(ArgError::WrongType { .. })
        ));
    }

    #[test]
    fn reads_present_arguments() {
        let args = vec![Value::Str("png".into()), Value::Int(7), Value::Bool(true)];
        assert_eq!(str_arg(&args, 0, "target").unwrap(), "png");
        assert_eq!(int_arg(&args, 1, "n").unwrap(), 7);
        assert!(bool_arg(&args, 2, "flag").unwrap());
    }
}
