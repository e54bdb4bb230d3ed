//! AST/legacy-descriptor to [`crate::model`] conversion (spec.md §4.3,
//! §4.4). Every converter here builds a [`crate::model::Module`] whose
//! type references are still `Forward`; the [`crate::linker`] resolves
//! them in a later, strictly serial pass.

pub mod native;
pub mod legacy;

use crate::ast::{UnaryOp as AstUnaryOp, ValueAst};
use crate::model::{TypeSpecifier, Value};

/// Lowers a parsed value expression into its linked-model shape, leaving
/// any bare identifier as `Value::Identifier` for the type checker to
/// reclassify as an enumerant or const reference once the target type
/// is known (spec.md §3: `Value` carries both forms).
pub fn lower_value(v: &ValueAst) -> Value {
    match v {
        ValueAst::Bool(b, _) => Value::Bool(*b),
        ValueAst::Int(i, _) => Value::Int(*i),
        ValueAst::Float(f, _) => Value::Float(*f),
        ValueAst::Text(t, _) => Value::Text(t.clone()),
        ValueAst::Data(d, _) => Value::Data(d.clone()),
        ValueAst::List(items, _) => Value::List(items.iter().map(lower_value).collect()),
        ValueAst::Struct(fields, _) => Value::Struct(
            fields
                .iter()
                .map(|(name, val)| (name.clone(), lower_value(val)))
                .collect(),
        ),
        ValueAst::Enumerant(q) | ValueAst::Ident(q) => Value::Identifier {
            qualifier: q.qualifier.clone(),
            name: q.name.clone(),
        },
        ValueAst::Unary(op, inner, _) => {
            let op = match op {
                AstUnaryOp::Plus => crate::ast::UnaryOp::Plus,
                AstUnaryOp::Neg => crate::ast::UnaryOp::Neg,
                AstUnaryOp::Not => crate::ast::UnaryOp::Not,
            };
            Value::Unary(op, Box::new(lower_value(inner)))
        }
        ValueAst::Binary(op, lhs, rhs, _) => {
            Value::Binary(*op, Box::new(lower_value(lhs)), Box::new(lower_value(rhs)))
        }
    }
}

/// Lowers a parsed type expression into a `Forward` specifier.
pub fn lower_type_expr(ty: &crate::ast::TypeExprAst) -> TypeSpecifier {
    TypeSpecifier::Forward {
        qualifier: ty.qualifier.clone(),
        name: ty.name.clone(),
        arguments: ty.parameters.iter().map(lower_type_expr).collect(),
    }
}

