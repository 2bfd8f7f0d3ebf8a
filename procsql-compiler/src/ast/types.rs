use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TypeName {
    Int,
    Text,
    Bool,
    Blob,
    Uuid,
    Null,
    /// Matches any other type. Produced for bind parameters whose type is not
    /// known yet, and substituted after a reported error so that one mistake
    /// does not cascade into more.
    Unknown,
}

/// Type of a single value.
///
/// Equality is structural. Use [DataType::matches] for checks that must let
/// the `unknown` type through.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataType {
    pub name: TypeName,
    pub is_array: bool,
}

impl DataType {
    pub const INT: DataType = DataType::scalar(TypeName::Int);
    pub const TEXT: DataType = DataType::scalar(TypeName::Text);
    pub const BOOL: DataType = DataType::scalar(TypeName::Bool);
    pub const BLOB: DataType = DataType::scalar(TypeName::Blob);
    pub const UUID: DataType = DataType::scalar(TypeName::Uuid);
    pub const NULL: DataType = DataType::scalar(TypeName::Null);
    pub const UNKNOWN: DataType = DataType::scalar(TypeName::Unknown);

    pub const fn scalar(name: TypeName) -> Self {
        DataType {
            name,
            is_array: false,
        }
    }

    pub const fn array(name: TypeName) -> Self {
        DataType {
            name,
            is_array: true,
        }
    }

    /// Type of one element of this array type.
    pub fn element(&self) -> DataType {
        DataType::scalar(self.name)
    }

    pub fn is_unknown(&self) -> bool {
        self.name == TypeName::Unknown
    }

    pub fn is_null(&self) -> bool {
        self.name == TypeName::Null && !self.is_array
    }

    /// Equality in which `unknown` matches anything.
    pub fn matches(&self, other: &DataType) -> bool {
        if self.is_unknown() || other.is_unknown() {
            return true;
        }
        self == other
    }

    /// Whether a variable can be declared with this type.
    pub fn is_declarable(&self) -> bool {
        !matches!(self.name, TypeName::Null | TypeName::Unknown)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.is_array {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (name, is_array) = match lower.strip_suffix("[]") {
            Some(name) => (name, true),
            None => (lower.as_str(), false),
        };

        let name = match name {
            "integer" | "int8" => TypeName::Int,
            "boolean" => TypeName::Bool,
            "bytea" => TypeName::Blob,
            other => TypeName::from_str(other).map_err(|_| format!("unknown type `{s}`"))?,
        };
        Ok(DataType { name, is_array })
    }
}

impl TryFrom<String> for DataType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DataType::from_str(&value)
    }
}

impl From<DataType> for String {
    fn from(ty: DataType) -> Self {
        ty.to_string()
    }
}
