//! Type inspection.
//!
//! A per-kind analyzer over XorNodes. Open context nodes and cycles type as
//! Unknown; everything else gets the shallow type the editor surfaces need.
//! Results are memoized per node id through the cache split.

use crate::cache::Inspector;
use crate::scope::ScopeItem;
use crate::types::{Type, TypeKind};
use indexmap::IndexMap;
use mlang_ast::node::{LiteralKind, PrimitiveTypeKind};
use mlang_ast::{AstNode, NodeId, XorNode};
use mlang_diagnostics::CommonError;

impl Inspector<'_> {
    /// The type of the node with the given id.
    pub fn type_for(&mut self, id: NodeId) -> Result<Type, CommonError> {
        if let Some(existing) = self.cached_type(id) {
            return Ok(existing.clone());
        }
        if !self.in_progress.insert(id) {
            // Mutually recursive bindings bottom out as unknown.
            return Ok(Type::unknown());
        }
        let result = self.compute_type(id);
        self.in_progress.remove(&id);
        let computed = result?;
        self.delta.type_by_id.insert(id, computed.clone());
        Ok(computed)
    }

    fn compute_type(&mut self, id: NodeId) -> Result<Type, CommonError> {
        let collection = self.collection;
        let node = match collection.expect_xor_node(id)? {
            XorNode::Context(_) => return Ok(Type::unknown()),
            XorNode::Ast(node) => node,
        };

        match node {
            AstNode::LiteralExpression(literal) => Ok(match literal.literal_kind {
                LiteralKind::Numeric => Type::new(TypeKind::Number),
                LiteralKind::Text => Type::new(TypeKind::Text),
                LiteralKind::Logical => Type::new(TypeKind::Logical),
                LiteralKind::Null => Type::nullable(TypeKind::Null),
            }),

            AstNode::IdentifierExpression(expression) => {
                let Some(name) = self.leaf_literal(expression.identifier) else {
                    return Ok(Type::unknown());
                };
                let name = name.to_string();
                let scope = self.scope_for(id)?;
                match scope.get(&name) {
                    Some(item) => {
                        let item = item.clone();
                        self.type_of_scope_item(&item)
                    }
                    None => Ok(Type::unknown()),
                }
            }

            AstNode::IfExpression(expression) => {
                let true_type = self.type_for(expression.true_expression)?;
                let false_type = self.type_for(expression.false_expression)?;
                Ok(unify(true_type, false_type))
            }

            AstNode::RecordExpression(record) => {
                let mut fields = IndexMap::new();
                for csv in collection.child_ids(record.content).to_vec() {
                    let Some(kvp) = collection.csv_content(csv) else {
                        continue;
                    };
                    if let Some(AstNode::GeneralizedIdentifierPairedExpression(pair)) =
                        collection.ast_node(kvp)
                    {
                        let Some(name) = collection
                            .ast_node(pair.key)
                            .and_then(AstNode::maybe_literal)
                            .map(str::to_string)
                        else {
                            continue;
                        };
                        let value = pair.value;
                        let field_type = self.type_for(value)?;
                        fields.insert(name, field_type);
                    }
                }
                Ok(Type::new(TypeKind::Record { fields }))
            }

            AstNode::ListExpression(_) | AstNode::RangeExpression(_) => {
                Ok(Type::new(TypeKind::List))
            }

            AstNode::FunctionExpression(function) => {
                let return_type = match function.maybe_return_type {
                    Some(annotation) => self.type_from_annotation(annotation),
                    None => self.type_for(function.expression)?,
                };
                Ok(Type::new(TypeKind::Function {
                    return_type: Box::new(return_type),
                }))
            }

            AstNode::EachExpression(each) => {
                let return_type = self.type_for(each.paired)?;
                Ok(Type::new(TypeKind::Function {
                    return_type: Box::new(return_type),
                }))
            }

            AstNode::LetExpression(let_expression) => self.type_for(let_expression.expression),
            AstNode::ParenthesizedExpression(wrapped) => self.type_for(wrapped.content),
            AstNode::MetadataExpression(bin_op) => self.type_for(bin_op.left),

            AstNode::UnaryExpression(unary) => {
                let negates = collection
                    .array_elements(unary.operators)
                    .map(|operators| {
                        operators.iter().any(|operator| {
                            self.leaf_literal(*operator) == Some("not")
                        })
                    })
                    .unwrap_or(false);
                if negates {
                    Ok(Type::new(TypeKind::Logical))
                } else {
                    Ok(Type::new(TypeKind::Number))
                }
            }

            AstNode::ArithmeticExpression(bin_op) => {
                let left = self.type_for(bin_op.left)?;
                let right = self.type_for(bin_op.right)?;
                let operator = self.leaf_literal(bin_op.operator_constant).unwrap_or("");
                match (&left.kind, &right.kind, operator) {
                    (TypeKind::Number, TypeKind::Number, _) => Ok(Type::new(TypeKind::Number)),
                    (TypeKind::Text, TypeKind::Text, "&") => Ok(Type::new(TypeKind::Text)),
                    _ => Ok(Type::any()),
                }
            }

            AstNode::LogicalExpression(_)
            | AstNode::EqualityExpression(_)
            | AstNode::RelationalExpression(_)
            | AstNode::IsExpression(_) => Ok(Type::new(TypeKind::Logical)),

            AstNode::AsExpression(bin_op) => Ok(self.type_from_annotation(bin_op.right)),

            AstNode::ErrorHandlingExpression(handler) => {
                let protected = self.type_for(handler.protected_expression)?;
                match handler.maybe_otherwise_expression {
                    Some(otherwise) => {
                        let fallback = match collection.ast_node(otherwise) {
                            Some(AstNode::OtherwiseExpression(paired)) => {
                                self.type_for(paired.paired)?
                            }
                            _ => Type::unknown(),
                        };
                        Ok(unify(protected, fallback))
                    }
                    None => Ok(protected),
                }
            }

            AstNode::ErrorRaisingExpression(_) => Ok(Type::new(TypeKind::None)),

            AstNode::RecursivePrimaryExpression(recursive) => {
                let mut current = self.type_for(recursive.head)?;
                let elements = collection
                    .array_elements(recursive.recursive_expressions)
                    .map(<[NodeId]>::to_vec)
                    .unwrap_or_default();
                for element in elements {
                    current = self.apply_access(current, element)?;
                }
                Ok(current)
            }

            AstNode::TypePrimaryType(_) | AstNode::PrimitiveType(_) => {
                Ok(Type::new(TypeKind::Type))
            }

            AstNode::NotImplementedExpression(_) => Ok(Type::any()),

            _ => Ok(Type::unknown()),
        }
    }

    /// One invoke/field-access/item-access step over the head's type.
    fn apply_access(&mut self, current: Type, element: NodeId) -> Result<Type, CommonError> {
        let collection = self.collection;
        match collection.ast_node(element) {
            Some(AstNode::InvokeExpression(_)) => match current.kind {
                TypeKind::Function { return_type } => Ok(*return_type),
                _ => Ok(Type::any()),
            },
            Some(AstNode::FieldSelector(selector)) => {
                let Some(name) = collection
                    .ast_node(selector.content)
                    .and_then(AstNode::maybe_literal)
                else {
                    return Ok(Type::any());
                };
                match &current.kind {
                    TypeKind::Record { fields } => {
                        Ok(fields.get(name).cloned().unwrap_or_else(Type::any))
                    }
                    _ => Ok(Type::any()),
                }
            }
            _ => Ok(Type::any()),
        }
    }

    /// The declared type of a scope item, or what its value computes to.
    pub(crate) fn type_of_scope_item(&mut self, item: &ScopeItem) -> Result<Type, CommonError> {
        match item {
            ScopeItem::Each { .. } => Ok(Type::any()),
            ScopeItem::LetVariable { maybe_value_id, .. }
            | ScopeItem::RecordField { maybe_value_id, .. }
            | ScopeItem::SectionMember { maybe_value_id, .. } => match maybe_value_id {
                Some(value_id) => self.type_for(*value_id),
                None => Ok(Type::unknown()),
            },
            ScopeItem::Parameter { maybe_type_id, .. } => match maybe_type_id {
                Some(type_id) => Ok(self.type_from_annotation(*type_id)),
                None => Ok(Type::any()),
            },
        }
    }

    /// Resolve an `as <nullable primitive type>` annotation chain to a type.
    fn type_from_annotation(&self, id: NodeId) -> Type {
        match self.collection.ast_node(id) {
            Some(AstNode::AsNullablePrimitiveType(paired)) => self.type_from_annotation(paired.paired),
            Some(AstNode::NullablePrimitiveType(paired)) => {
                let mut inner = self.type_from_annotation(paired.paired);
                inner.is_nullable = true;
                inner
            }
            Some(AstNode::PrimitiveType(primitive)) => primitive_type(primitive.primitive_kind),
            _ => Type::unknown(),
        }
    }
}

/// Two branches with the same kind keep it; anything else widens to any.
fn unify(left: Type, right: Type) -> Type {
    if left == right {
        left
    } else {
        Type::any()
    }
}

fn primitive_type(kind: PrimitiveTypeKind) -> Type {
    match kind {
        PrimitiveTypeKind::Action => Type::new(TypeKind::Action),
        PrimitiveTypeKind::Any => Type::any(),
        PrimitiveTypeKind::AnyNonNull => Type::new(TypeKind::AnyNonNull),
        PrimitiveTypeKind::Binary => Type::new(TypeKind::Binary),
        PrimitiveTypeKind::Date => Type::new(TypeKind::Date),
        PrimitiveTypeKind::DateTime => Type::new(TypeKind::DateTime),
        PrimitiveTypeKind::DateTimeZone => Type::new(TypeKind::DateTimeZone),
        PrimitiveTypeKind::Duration => Type::new(TypeKind::Duration),
        PrimitiveTypeKind::Function => Type::new(TypeKind::Function {
            return_type: Box::new(Type::any()),
        }),
        PrimitiveTypeKind::List => Type::new(TypeKind::List),
        PrimitiveTypeKind::Logical => Type::new(TypeKind::Logical),
        PrimitiveTypeKind::None => Type::new(TypeKind::None),
        PrimitiveTypeKind::Null => Type::nullable(TypeKind::Null),
        PrimitiveTypeKind::Number => Type::new(TypeKind::Number),
        PrimitiveTypeKind::Record => Type::new(TypeKind::Record {
            fields: IndexMap::new(),
        }),
        PrimitiveTypeKind::Table => Type::new(TypeKind::Table),
        PrimitiveTypeKind::Text => Type::new(TypeKind::Text),
        PrimitiveTypeKind::Time => Type::new(TypeKind::Time),
        PrimitiveTypeKind::Type => Type::new(TypeKind::Type),
    }
}
