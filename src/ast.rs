/*
Copyright 2025 The zedc Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use crate::lexer::Token;

// Every node owns its children; dropping a module drops the whole tree.
// Leaf nodes keep the token that produced them so later passes can point
// back at the source.

// --- Expressions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    PreInc,  // ++e
    PreDec,  // --e
    Plus,    // +e
    Minus,   // -e
    LogNot,  // !e
    BitNot,  // ~e
    AddrOf,  // &e
    Deref,   // *e
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOp {
    Inc, // e++
    Dec, // e--
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
    BitAnd,
    BitXor,
    BitOr,
    LogAnd,
    LogOr,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    OrAssign,
    XorAssign,
}

impl BinOp {
    pub fn is_assign(&self) -> bool {
        matches!(
            self,
            BinOp::Assign
                | BinOp::AddAssign
                | BinOp::SubAssign
                | BinOp::MulAssign
                | BinOp::DivAssign
                | BinOp::ModAssign
                | BinOp::ShlAssign
                | BinOp::ShrAssign
                | BinOp::AndAssign
                | BinOp::OrAssign
                | BinOp::XorAssign
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(Token),                   // 42, 0x2A
    Char(Token),                  // 'a'
    Str(Token),                   // "abc"
    Ident(Token),                 // name
    Paren(Box<Expr>),             // (e)
    Cast(TypeName, Box<Expr>),    // (type)e
    CompoundLiteral(TypeName, InitList), // (type){ ... }
    Member(Box<Expr>, bool, Token), // e.m / e->m (true for ->)
    Index(Box<Expr>, Box<Expr>),  // e[i]
    Call(Box<Expr>, Vec<Expr>),   // f(a, b)
    Unary(UnOp, Box<Expr>),
    Postfix(PostOp, Box<Expr>),
    SizeofExpr(Box<Expr>),        // sizeof e
    SizeofType(TypeName),         // sizeof(type)
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>), // c ? t : f
    Comma(Box<Expr>, Box<Expr>),  // a, b
    Concat(Vec<Expr>),            // "a" "b" adjacent string literals
}

// --- Type specifiers ---

#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Basic(Token),       // void, char, short, int, long, signed, unsigned, ...
    Name(Token),        // typedef name
    Record(RecordSpec), // struct / union
    Enum(EnumSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSpec {
    pub is_union: bool,
    pub name: Option<Token>,
    pub attrs: Vec<AttrSpec>,
    // None for a forward reference without a body
    pub members: Option<Vec<RecordMember>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordMember {
    // ordinary specifier-qualifier list plus declarators
    Field(DeclSpecs, Vec<Declarator>),
    // anonymous struct/union member
    Anonymous(TypeSpec),
    // macro-based member declaration
    Macro(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSpec {
    pub name: Option<Token>,
    // None for a forward reference without a body
    pub elems: Option<Vec<EnumElem>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumElem {
    pub name: Token,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttrSpec {
    // __attribute__((name(args), ...))
    pub attrs: Vec<Attr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: Token,
    pub args: Vec<Expr>,
}

// --- Declarators ---

// A declarator wraps an optional inner identifier; composition order
// expresses the C declarator syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Declarator {
    Ident(Token),
    // abstract declarator (no identifier)
    None,
    Paren(Box<Declarator>),
    Array(Box<Declarator>, Option<Box<Expr>>),
    Func(Box<Declarator>, Vec<ParamDecl>, bool), // true for trailing ellipsis
    Ptr(Vec<Token>, Box<Declarator>),            // type-qualifier list, inner
}

impl Declarator {
    /// The identifier buried inside the declarator tree, if any.
    pub fn ident(&self) -> Option<&Token> {
        match self {
            Declarator::Ident(tok) => Some(tok),
            Declarator::None => None,
            Declarator::Paren(inner)
            | Declarator::Array(inner, _)
            | Declarator::Func(inner, _, _)
            | Declarator::Ptr(_, inner) => inner.ident(),
        }
    }

    pub fn is_abstract(&self) -> bool {
        self.ident().is_none()
    }

    /// True when this declares a function rather than an object: the
    /// constructor nearest the identifier is a function layer. Pointer
    /// layers outside it only shape the return type (`int *f(void)`), while
    /// a pointer inside it makes a function-pointer object (`int (*f)(void)`).
    pub fn is_function(&self) -> bool {
        match self {
            Declarator::Func(inner, _, _) => inner.is_direct_ident(),
            Declarator::Paren(inner)
            | Declarator::Ptr(_, inner)
            | Declarator::Array(inner, _) => inner.is_function(),
            _ => false,
        }
    }

    fn is_direct_ident(&self) -> bool {
        match self {
            Declarator::Ident(_) => true,
            Declarator::Paren(inner) => inner.is_direct_ident(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub specs: DeclSpecs,
    pub decl: Declarator,
}

// --- Declaration specifiers ---

#[derive(Debug, Clone, PartialEq)]
pub enum DeclSpec {
    StorageClass(Token), // auto, extern, register, static, typedef
    TypeQual(Token),     // const, restrict, volatile
    FuncSpec(Token),     // inline
    TypeSpec(TypeSpec),
    Attr(AttrSpec),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeclSpecs {
    pub items: Vec<DeclSpec>,
}

impl DeclSpecs {
    pub fn has_type_spec(&self) -> bool {
        self.items
            .iter()
            .any(|s| matches!(s, DeclSpec::TypeSpec(_)))
    }

    pub fn has_storage_class(&self, name: &str) -> bool {
        self.items
            .iter()
            .any(|s| matches!(s, DeclSpec::StorageClass(t) if t.text == name))
    }
}

/// A type name: specifier-qualifier list plus an abstract declarator, as in
/// casts and sizeof.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub specs: DeclSpecs,
    pub decl: Declarator,
}

// --- Initializers and declarations ---

#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    Expr(Box<Expr>),
    List(InitList),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitList {
    pub inits: Vec<Init>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitDeclarator {
    pub decl: Declarator,
    pub init: Option<Init>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub specs: DeclSpecs,
    pub decls: Vec<InitDeclarator>,
}

// --- Statements ---

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub braced: bool,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Decl(Declaration),
    Expr(Expr),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsmOperand {
    pub name: Option<Token>, // [symbolic-name]
    pub constraint: Expr,    // constraint string
    pub expr: Expr,          // (expression)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsmStmt {
    pub is_volatile: bool,
    pub is_goto: bool,
    pub template: Expr,
    pub outputs: Vec<AsmOperand>,
    pub inputs: Vec<AsmOperand>,
    pub clobbers: Vec<Expr>,
    pub labels: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Block),
    Expr(Expr),
    Decl(Declaration),
    Null,
    Goto(Token),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_block: Block,
        elifs: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    DoWhile {
        body: Block,
        cond: Expr,
    },
    For {
        init: ForInit,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Block,
    },
    Switch {
        cond: Expr,
        body: Block,
    },
    Case(Expr),
    Default,
    Label(Token),
    // call-shaped expression statement without ';' whose body follows
    LoopMacro {
        call: Expr,
        body: Block,
    },
    Break,
    Continue,
    Asm(AsmStmt),
}

// --- Module ---

#[derive(Debug, Clone, PartialEq)]
pub enum GlobalDecl {
    Decl(Declaration),
    FuncDef {
        specs: DeclSpecs,
        decl: Declarator,
        body: Block,
    },
    // global macro-based declaration, e.g. LIST_INIT(foo);
    Macro(Expr),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub decls: Vec<GlobalDecl>,
}
