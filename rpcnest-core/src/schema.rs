use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{FieldError, RpcError};

type ParseFn = dyn Fn(Value) -> Result<Value, RpcError> + Send + Sync;

/// A validator that either accepts a JSON value (possibly normalized) or
/// rejects it.
///
/// Typed schemas deserialize into `T`, run an optional check and serialize
/// back, so defaults and renames on `T` shape what the handler receives.
#[derive(Clone)]
pub struct Schema {
    name: Cow<'static, str>,
    parse: Arc<ParseFn>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Schema").field(&self.name).finish()
    }
}

impl Schema {
    /// Shape-only schema for `T`.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        Self::with_check::<T, _>(short_name::<T>(), |_| Ok(()))
    }

    /// Schema for `T` that also runs its garde rules.
    pub fn validated<T>() -> Self
    where
        T: DeserializeOwned + Serialize + garde::Validate + 'static,
        T::Context: Default,
    {
        Self::with_check::<T, _>(short_name::<T>(), |value: &T| {
            value.validate().map_err(RpcError::from)
        })
    }

    /// Schema for `T` with a custom check on the decoded value.
    pub fn with_check<T, F>(name: impl Into<Cow<'static, str>>, check: F) -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
        F: Fn(&T) -> Result<(), RpcError> + Send + Sync + 'static,
    {
        Self::custom(name, move |value| {
            let typed: T = serde_json::from_value(value).map_err(|e| {
                RpcError::Validation(vec![FieldError {
                    field: String::new(),
                    message: e.to_string(),
                    code: "invalid_type".into(),
                }])
            })?;
            check(&typed)?;
            serde_json::to_value(&typed)
                .map_err(|e| RpcError::Internal(format!("schema re-encoding failed: {e}")))
        })
    }

    /// Schema from an arbitrary parse function.
    pub fn custom<F>(name: impl Into<Cow<'static, str>>, parse: F) -> Self
    where
        F: Fn(Value) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parse: Arc::new(parse),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parse(&self, value: Value) -> Result<Value, RpcError> {
        (self.parse)(value)
    }
}

fn short_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

// Generated handlers use autoref specialization to validate when a type
// implements `garde::Validate` and skip silently otherwise:
//
//     (&__AutoValidator(&value)).__maybe_validate()
//
// `__DoValidate` matches directly; `__SkipValidate` needs one more autoref
// and only wins when the first impl does not apply.

#[doc(hidden)]
pub struct __AutoValidator<'a, T>(pub &'a T);

#[doc(hidden)]
pub trait __DoValidate {
    fn __maybe_validate(&self) -> Result<(), RpcError>;
}

impl<T: garde::Validate> __DoValidate for __AutoValidator<'_, T>
where
    T::Context: Default,
{
    fn __maybe_validate(&self) -> Result<(), RpcError> {
        self.0.validate().map_err(RpcError::from)
    }
}

#[doc(hidden)]
pub trait __SkipValidate {
    fn __maybe_validate(&self) -> Result<(), RpcError>;
}

impl<T> __SkipValidate for &__AutoValidator<'_, T> {
    fn __maybe_validate(&self) -> Result<(), RpcError> {
        Ok(())
    }
}

pub(crate) fn convert_garde_report(report: &garde::Report) -> Vec<FieldError> {
    report
        .iter()
        .map(|(path, error)| {
            let field = path.to_string();
            FieldError {
                field: if field.is_empty() { "value".into() } else { field },
                message: error.message().to_string(),
                code: "validation".into(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, garde::Validate)]
    struct NewUser {
        #[garde(length(min = 2))]
        name: String,
        #[garde(skip)]
        #[serde(default)]
        admin: bool,
    }

    #[test]
    fn typed_schema_fills_defaults() {
        let schema = Schema::of::<NewUser>();
        let parsed = schema.parse(json!({"name": "Ada"})).unwrap();
        assert_eq!(parsed, json!({"name": "Ada", "admin": false}));
        assert_eq!(schema.name(), "NewUser");
    }

    #[test]
    fn validated_schema_reports_fields() {
        let err = Schema::validated::<NewUser>()
            .parse(json!({"name": "A"}))
            .unwrap_err();
        match err {
            RpcError::Validation(fields) => assert_eq!(fields[0].field, "name"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn shape_mismatch_is_a_validation_error() {
        let err = Schema::of::<NewUser>().parse(json!({"wrong": 1})).unwrap_err();
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn custom_schema_can_normalize() {
        let upper = Schema::custom("upper", |v| match v {
            Value::String(s) => Ok(Value::String(s.to_uppercase())),
            _ => Err(RpcError::InvalidInput("expected a string".into())),
        });
        assert_eq!(upper.parse(json!("abc")).unwrap(), json!("ABC"));
    }

    #[test]
    fn auto_validator_skips_types_without_rules() {
        #[allow(unused_imports)]
        use super::{__DoValidate as _, __SkipValidate as _};
        let n = 5u32;
        assert!((&__AutoValidator(&n)).__maybe_validate().is_ok());
        let bad = NewUser { name: "x".into(), admin: false };
        assert!((&__AutoValidator(&bad)).__maybe_validate().is_err());
    }
}
