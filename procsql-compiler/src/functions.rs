//! Builtin functions and resolution of call targets.

use std::str::FromStr;

use strum::{AsRefStr, Display, EnumString};

use crate::ast::{DataType, TypeName};
use crate::error::Reason;
use crate::schema::{NamedType, Schema};

/// Functions known to every statement, regardless of the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Builtin {
    Abs,
    Error,
    Notice,
    #[strum(to_string = "uuid_generate_v5")]
    UuidGenerateV5,
    Encode,
    Decode,
    Digest,
    GenerateDbid,
    ArrayAppend,
    ArrayPrepend,
    ArrayCat,
    ArrayLength,
    BitLength,
    CharLength,
    CharacterLength,
    Length,
    OctetLength,
    Lower,
    Upper,
    Lpad,
    Rpad,
    Ltrim,
    Rtrim,
    Trim,
    Position,
    Substring,
    Format,
    Coalesce,
    Count,
    Sum,
    Min,
    Max,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        Builtin::from_str(&name.to_lowercase()).ok()
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Builtin::Count | Builtin::Sum | Builtin::Min | Builtin::Max)
    }

    /// Checks argument types and returns the type of the result.
    ///
    /// `star` is set for `count(*)`, which has no arguments.
    pub fn validate_args(&self, args: &[DataType], star: bool) -> Result<DataType, Reason> {
        use Builtin::*;

        if star {
            return match self {
                Count if args.is_empty() => Ok(DataType::INT),
                _ => Err(Reason::Simple(format!("`{self}(*)` is not supported"))),
            };
        }

        let check = Signature { builtin: *self, args };
        match self {
            Abs => {
                check.count(1)?;
                check.arg(0, &DataType::INT)?;
                Ok(DataType::INT)
            }
            Error | Notice => {
                check.count(1)?;
                check.arg(0, &DataType::TEXT)?;
                Ok(DataType::NULL)
            }
            UuidGenerateV5 => {
                check.count(2)?;
                check.arg(0, &DataType::UUID)?;
                check.arg(1, &DataType::TEXT)?;
                Ok(DataType::UUID)
            }
            Encode => {
                check.count(2)?;
                check.arg(0, &DataType::BLOB)?;
                check.arg(1, &DataType::TEXT)?;
                Ok(DataType::TEXT)
            }
            Decode => {
                check.count(2)?;
                check.arg(0, &DataType::TEXT)?;
                check.arg(1, &DataType::TEXT)?;
                Ok(DataType::BLOB)
            }
            Digest => {
                check.count(2)?;
                check.arg_one_of(0, &[DataType::TEXT, DataType::BLOB])?;
                check.arg(1, &DataType::TEXT)?;
                Ok(DataType::BLOB)
            }
            GenerateDbid => {
                check.count(2)?;
                check.arg(0, &DataType::TEXT)?;
                check.arg(1, &DataType::BLOB)?;
                Ok(DataType::TEXT)
            }
            ArrayAppend => {
                check.count(2)?;
                let array = check.array_arg(0)?;
                check.arg(1, &array.element())?;
                Ok(array)
            }
            ArrayPrepend => {
                check.count(2)?;
                let array = check.array_arg(1)?;
                check.arg(0, &array.element())?;
                Ok(array)
            }
            ArrayCat => {
                check.count(2)?;
                let array = check.array_arg(0)?;
                check.arg(1, &array)?;
                Ok(array)
            }
            ArrayLength => {
                check.count(1)?;
                check.array_arg(0)?;
                Ok(DataType::INT)
            }
            BitLength | CharLength | CharacterLength | Length | OctetLength => {
                check.count(1)?;
                check.arg(0, &DataType::TEXT)?;
                Ok(DataType::INT)
            }
            Lower | Upper => {
                check.count(1)?;
                check.arg(0, &DataType::TEXT)?;
                Ok(DataType::TEXT)
            }
            Lpad | Rpad => {
                check.count_between(2, 3)?;
                check.arg(0, &DataType::TEXT)?;
                check.arg(1, &DataType::INT)?;
                check.optional_arg(2, &DataType::TEXT)?;
                Ok(DataType::TEXT)
            }
            Ltrim | Rtrim | Trim => {
                check.count_between(1, 2)?;
                check.arg(0, &DataType::TEXT)?;
                check.optional_arg(1, &DataType::TEXT)?;
                Ok(DataType::TEXT)
            }
            Position => {
                check.count(2)?;
                check.arg(0, &DataType::TEXT)?;
                check.arg(1, &DataType::TEXT)?;
                Ok(DataType::INT)
            }
            Substring => {
                check.count_between(2, 3)?;
                check.arg(0, &DataType::TEXT)?;
                check.arg(1, &DataType::INT)?;
                check.optional_arg(2, &DataType::INT)?;
                Ok(DataType::TEXT)
            }
            Format => {
                check.count_between(1, usize::MAX)?;
                check.arg(0, &DataType::TEXT)?;
                Ok(DataType::TEXT)
            }
            Coalesce => {
                check.count_between(1, usize::MAX)?;
                let mut result = DataType::UNKNOWN;
                for (index, arg) in args.iter().enumerate() {
                    if arg.is_null() {
                        continue;
                    }
                    if result.is_unknown() {
                        result = arg.clone();
                    } else {
                        check.arg(index, &result)?;
                    }
                }
                Ok(result)
            }
            Count => {
                check.count(1)?;
                Ok(DataType::INT)
            }
            Sum => {
                check.count(1)?;
                check.arg(0, &DataType::INT)?;
                Ok(DataType::INT)
            }
            Min | Max => {
                check.count(1)?;
                check.arg_one_of(0, &[DataType::INT, DataType::TEXT])?;
                Ok(args[0].clone())
            }
        }
    }
}

struct Signature<'a> {
    builtin: Builtin,
    args: &'a [DataType],
}

impl<'a> Signature<'a> {
    fn count(&self, expected: usize) -> Result<(), Reason> {
        self.count_between(expected, expected)
    }

    fn count_between(&self, min: usize, max: usize) -> Result<(), Reason> {
        let found = self.args.len();
        if (min..=max).contains(&found) {
            return Ok(());
        }
        let expected = if min == max {
            format!("{min} arguments")
        } else if max == usize::MAX {
            format!("at least {min} arguments")
        } else {
            format!("{min} to {max} arguments")
        };
        Err(Reason::Expected {
            who: Some(format!("function `{}`", self.builtin)),
            expected,
            found: found.to_string(),
        })
    }

    fn arg(&self, index: usize, expected: &DataType) -> Result<(), Reason> {
        self.arg_one_of(index, std::slice::from_ref(expected))
    }

    fn optional_arg(&self, index: usize, expected: &DataType) -> Result<(), Reason> {
        if index < self.args.len() {
            self.arg(index, expected)?;
        }
        Ok(())
    }

    fn arg_one_of(&self, index: usize, expected: &[DataType]) -> Result<(), Reason> {
        let found = &self.args[index];
        if found.is_null() || expected.iter().any(|e| e.matches(found)) {
            return Ok(());
        }
        let expected = expected.iter().map(|e| format!("`{e}`")).collect::<Vec<_>>();
        Err(self.mismatch(index, expected.join(" or "), found))
    }

    fn array_arg(&self, index: usize) -> Result<DataType, Reason> {
        let found = &self.args[index];
        if found.is_unknown() {
            return Ok(DataType::array(TypeName::Unknown));
        }
        if !found.is_array {
            return Err(self.mismatch(index, "an array".to_string(), found));
        }
        Ok(found.clone())
    }

    fn mismatch(&self, index: usize, expected: String, found: &DataType) -> Reason {
        Reason::Expected {
            who: Some(format!("argument {} of `{}`", index + 1, self.builtin)),
            expected: format!("type {expected}"),
            found: format!("type `{found}`"),
        }
    }
}

/// What a call produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub fields: Vec<NamedType>,
    pub is_table: bool,
}

impl CallResult {
    fn scalar(name: &str, ty: DataType) -> Self {
        CallResult {
            fields: vec![NamedType::new(name, ty)],
            is_table: false,
        }
    }

    /// The single value of a call used as an expression.
    pub fn single_value(&self) -> Option<&DataType> {
        match self.fields.as_slice() {
            [field] if !self.is_table => Some(&field.ty),
            _ => None,
        }
    }
}

/// Resolves a call to a builtin or to a (foreign) procedure of the schema and
/// checks its arguments.
pub fn resolve_call(
    schema: &Schema,
    name: &str,
    args: &[DataType],
    star: bool,
) -> Result<CallResult, Reason> {
    if let Some(builtin) = Builtin::lookup(name) {
        let ty = builtin.validate_args(args, star)?;
        return Ok(CallResult::scalar(builtin.as_ref(), ty));
    }

    let callable = schema.find_callable(name).ok_or_else(|| Reason::NotFound {
        name: name.to_string(),
        namespace: "function".to_string(),
    })?;

    if star {
        return Err(Reason::Simple(format!(
            "procedure `{name}` cannot be called with `*`"
        )));
    }

    check_arguments(callable.name(), &callable.parameter_types(), args)?;

    Ok(match callable.returns() {
        Some(returns) => CallResult {
            fields: returns.fields.clone(),
            is_table: returns.is_table,
        },
        None => CallResult {
            fields: Vec::new(),
            is_table: false,
        },
    })
}

/// Checks argument count and types against procedure parameters. Null
/// arguments are accepted for any parameter.
pub fn check_arguments(name: &str, parameters: &[DataType], args: &[DataType]) -> Result<(), Reason> {
    if parameters.len() != args.len() {
        return Err(Reason::Expected {
            who: Some(format!("procedure `{name}`")),
            expected: format!("{} arguments", parameters.len()),
            found: args.len().to_string(),
        });
    }

    for (index, (param, arg)) in parameters.iter().zip(args).enumerate() {
        if !arg.is_null() && !param.matches(arg) {
            return Err(Reason::Expected {
                who: Some(format!("argument {} of `{name}`", index + 1)),
                expected: format!("type `{param}`"),
                found: format!("type `{arg}`"),
            });
        }
    }
    Ok(())
}
