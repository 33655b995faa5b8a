//! The type model used by inspection.
//!
//! Types are deliberately shallow — enough for editor tooling to label
//! scope items and expressions, not a full checker. Record fields keep
//! insertion order so hover output is stable.

use indexmap::IndexMap;
use std::fmt;

/// A computed type plus its nullability.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeKind,
    pub is_nullable: bool,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            is_nullable: false,
        }
    }

    pub fn nullable(kind: TypeKind) -> Self {
        Self {
            kind,
            is_nullable: true,
        }
    }

    pub fn any() -> Self {
        Self::new(TypeKind::Any)
    }

    pub fn unknown() -> Self {
        Self::new(TypeKind::Unknown)
    }
}

/// The specific kind of a type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Action,
    Any,
    AnyNonNull,
    Binary,
    Date,
    DateTime,
    DateTimeZone,
    Duration,
    Function {
        return_type: Box<Type>,
    },
    List,
    Logical,
    None,
    Null,
    Number,
    Record {
        fields: IndexMap<String, Type>,
    },
    Table,
    Text,
    Time,
    /// The type of type values themselves (`type number` as an expression).
    Type,
    /// Not enough information — open context nodes, cycles, unanalyzed kinds.
    Unknown,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nullable {
            write!(f, "nullable ")?;
        }
        match &self.kind {
            TypeKind::Action => write!(f, "action"),
            TypeKind::Any => write!(f, "any"),
            TypeKind::AnyNonNull => write!(f, "anynonnull"),
            TypeKind::Binary => write!(f, "binary"),
            TypeKind::Date => write!(f, "date"),
            TypeKind::DateTime => write!(f, "datetime"),
            TypeKind::DateTimeZone => write!(f, "datetimezone"),
            TypeKind::Duration => write!(f, "duration"),
            TypeKind::Function { return_type } => write!(f, "function as {}", return_type),
            TypeKind::List => write!(f, "list"),
            TypeKind::Logical => write!(f, "logical"),
            TypeKind::None => write!(f, "none"),
            TypeKind::Null => write!(f, "null"),
            TypeKind::Number => write!(f, "number"),
            TypeKind::Record { fields } => {
                write!(f, "[")?;
                for (i, (name, field_type)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", name, field_type)?;
                }
                write!(f, "]")
            }
            TypeKind::Table => write!(f, "table"),
            TypeKind::Text => write!(f, "text"),
            TypeKind::Time => write!(f, "time"),
            TypeKind::Type => write!(f, "type"),
            TypeKind::Unknown => write!(f, "unknown"),
        }
    }
}
