//! Parser output: one tagged node per construct, as spec.md §9 prescribes
//! ("a single sum type per category... exhaustive pattern matching at
//! every consumer") instead of the source dialect's marker-interface AST.

use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedName {
    pub qualifier: Option<String>,
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExprAst {
    pub qualifier: Option<String>,
    pub name: String,
    pub parameters: Vec<TypeExprAst>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    AndAnd,
    OrOr,
    BitAnd,
    BitOr,
    BitXor,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueAst {
    Bool(bool, Span),
    Int(i128, Span),
    Float(f64, Span),
    Text(String, Span),
    Data(Vec<u8>, Span),
    List(Vec<ValueAst>, Span),
    Struct(Vec<(String, ValueAst)>, Span),
    Enumerant(QualifiedName),
    Ident(QualifiedName),
    Unary(UnaryOp, Box<ValueAst>, Span),
    Binary(BinOp, Box<ValueAst>, Box<ValueAst>, Span),
}

impl ValueAst {
    pub fn span(&self) -> Span {
        match self {
            ValueAst::Bool(_, s)
            | ValueAst::Int(_, s)
            | ValueAst::Float(_, s)
            | ValueAst::Text(_, s)
            | ValueAst::Data(_, s)
            | ValueAst::List(_, s)
            | ValueAst::Struct(_, s)
            | ValueAst::Unary(_, _, s)
            | ValueAst::Binary(_, _, _, s) => *s,
            ValueAst::Enumerant(q) | ValueAst::Ident(q) => q.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationApplication {
    pub qualifier: Option<String>,
    pub name: String,
    pub value: Option<ValueAst>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationScope {
    Module,
    Union,
    Struct,
    Field,
    Enumerant,
    Enum,
    Api,
    ApiMethod,
    Sdk,
    SdkMethod,
    Const,
    Import,
    Star,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaTail {
    pub uid: Option<u64>,
    pub annotations: Vec<AnnotationApplication>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportAst {
    pub path: String,
    pub alias: Option<String>,
    pub is_dot_import: bool,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldAst {
    pub name: String,
    pub ty: TypeExprAst,
    pub default: Option<ValueAst>,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionAst {
    pub name: Option<String>,
    pub fields: Vec<FieldAst>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructAst {
    pub name: String,
    pub fields: Vec<FieldAst>,
    pub unions: Vec<UnionAst>,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumerantAst {
    pub name: String,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumAst {
    pub name: String,
    pub enumerants: Vec<EnumerantAst>,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiMethodAst {
    pub name: String,
    pub input: TypeExprAst,
    pub output: TypeExprAst,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiAst {
    pub name: String,
    pub methods: Vec<ApiMethodAst>,
    pub extends: Vec<QualifiedName>,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SdkParamAst {
    pub name: String,
    pub ty: TypeExprAst,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SdkMethodAst {
    pub name: String,
    pub params: Vec<SdkParamAst>,
    pub output: Option<TypeExprAst>,
    pub nothrows: bool,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SdkAst {
    pub name: String,
    pub methods: Vec<SdkMethodAst>,
    pub extends: Vec<QualifiedName>,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstAst {
    pub name: String,
    pub ty: TypeExprAst,
    pub value: ValueAst,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDeclAst {
    pub name: String,
    pub value_type: TypeExprAst,
    pub scopes: Vec<AnnotationScope>,
    pub meta: MetaTail,
    pub span: Span,
}

/// `impl` execution steps (spec.md §4.2, §9 open question 2): parsed, kept
/// on the AST as an unchecked future-extension payload, never transcribed
/// into the descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum ImplStep {
    Var {
        name: String,
        ty: Option<TypeExprAst>,
        init: Option<ValueAst>,
    },
    Set {
        target: QualifiedName,
        value: ValueAst,
    },
    If {
        cond: ValueAst,
        then_body: Vec<ImplStep>,
        else_body: Vec<ImplStep>,
    },
    Switch {
        scrutinee: ValueAst,
        cases: Vec<(Option<ValueAst>, Vec<ImplStep>)>,
    },
    While {
        cond: ValueAst,
        body: Vec<ImplStep>,
    },
    For {
        binding: String,
        iterable: ValueAst,
        body: Vec<ImplStep>,
    },
    Return(Option<ValueAst>),
    Throw(ValueAst),
    Exec {
        invocation: QualifiedName,
        args: Vec<ValueAst>,
        is_async: bool,
        is_await: bool,
        catch_body: Option<Vec<ImplStep>>,
    },
    Prose(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImplAst {
    pub target: QualifiedName,
    pub steps: Vec<ImplStep>,
    pub meta: MetaTail,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModuleAst {
    pub syntax: Option<String>,
    pub leading_comment: Option<String>,
    pub module_meta: MetaTail,
    pub imports: Vec<ImportAst>,
    pub annotations: Vec<AnnotationDeclAst>,
    pub consts: Vec<ConstAst>,
    pub enums: Vec<EnumAst>,
    pub structs: Vec<StructAst>,
    pub apis: Vec<ApiAst>,
    pub sdks: Vec<SdkAst>,
    pub impls: Vec<ImplAst>,
}
