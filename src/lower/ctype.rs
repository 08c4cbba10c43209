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

use super::Lowerer;
use crate::ast::*;
use crate::errors::CompileError;
use crate::ir::IrType;
use crate::lexer::TokenKind;

/// The source-level view of a type, as resolved from declaration specifiers
/// and declarators.
#[derive(Debug, Clone, PartialEq)]
pub enum CType {
    Void,
    Int { bits: u32, signed: bool },
    Ptr(Box<CType>),
    Array(Box<CType>, u32),
}

impl CType {
    pub fn int16() -> Self {
        CType::Int {
            bits: 16,
            signed: true,
        }
    }

    pub fn sizeof(&self) -> u32 {
        self.to_ir().sizeof()
    }

    /// Width in bits when the type is loaded as a value. Arrays decay to
    /// their address.
    pub fn value_bits(&self) -> u32 {
        match self {
            CType::Void => 0,
            CType::Int { bits, .. } => *bits,
            CType::Ptr(_) | CType::Array(_, _) => 16,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, CType::Int { signed: true, .. })
    }

    pub fn to_ir(&self) -> IrType {
        match self {
            CType::Void => IrType::Int { bits: 0 },
            CType::Int { bits, .. } => IrType::Int { bits: *bits },
            CType::Ptr(_) => IrType::Ptr,
            CType::Array(elem, count) => IrType::Array {
                elem: Box::new(elem.to_ir()),
                count: *count,
            },
        }
    }
}

impl Lowerer {
    /// Resolve declaration specifiers to a base type. Records are not
    /// lowered; the front end accepts them but this back end rejects them
    /// with a semantic error.
    pub(crate) fn resolve_specs(&self, specs: &DeclSpecs) -> Result<CType, CompileError> {
        let mut signed = true;
        let mut explicit_unsigned = false;
        let mut longs = 0;
        let mut short = false;
        let mut char_ = false;
        let mut int128 = false;
        let mut void = false;
        let mut int_ = false;
        let mut name: Option<&str> = None;

        for item in &specs.items {
            let spec = match item {
                DeclSpec::TypeSpec(spec) => spec,
                _ => continue,
            };
            match spec {
                TypeSpec::Basic(tok) => match tok.kind {
                    TokenKind::KwVoid => void = true,
                    TokenKind::KwChar => char_ = true,
                    TokenKind::KwShort => short = true,
                    TokenKind::KwInt => int_ = true,
                    TokenKind::KwInt128 => int128 = true,
                    TokenKind::KwLong => longs += 1,
                    TokenKind::KwSigned => signed = true,
                    TokenKind::KwUnsigned => {
                        signed = false;
                        explicit_unsigned = true;
                    }
                    TokenKind::KwFloat | TokenKind::KwDouble => {
                        return Err(CompileError::SemanticErrorNoIdent {
                            reason: "floating-point types are not supported".to_string(),
                        });
                    }
                    _ => {}
                },
                TypeSpec::Name(tok) => name = Some(&tok.text),
                TypeSpec::Enum(_) => int_ = true,
                TypeSpec::Record(_) => {
                    return Err(CompileError::SemanticErrorNoIdent {
                        reason: "record types cannot be lowered".to_string(),
                    });
                }
            }
        }

        if void {
            return Ok(CType::Void);
        }
        if char_ {
            // plain char is signed in this dialect
            return Ok(CType::Int {
                bits: 8,
                signed: !explicit_unsigned,
            });
        }
        if int128 {
            return Ok(CType::Int { bits: 128, signed });
        }
        if longs >= 2 {
            return Ok(CType::Int { bits: 64, signed });
        }
        if longs == 1 {
            return Ok(CType::Int { bits: 32, signed });
        }
        if short || int_ || explicit_unsigned {
            return Ok(CType::Int { bits: 16, signed });
        }
        if let Some(name) = name {
            if let Some(ty) = self.typedefs.get(name) {
                return Ok(ty.clone());
            }
            return Err(CompileError::SemanticError {
                ident: name.to_string(),
                reason: "unknown type name".to_string(),
            });
        }

        // bare `signed` and friends
        Ok(CType::Int { bits: 16, signed })
    }

    /// Apply a declarator to a base type, from the outside in.
    pub(crate) fn apply_declarator(
        &self,
        base: CType,
        decl: &Declarator,
    ) -> Result<CType, CompileError> {
        match decl {
            Declarator::Ident(_) | Declarator::None => Ok(base),
            Declarator::Paren(inner) => self.apply_declarator(base, inner),
            Declarator::Ptr(_, inner) => self.apply_declarator(CType::Ptr(Box::new(base)), inner),
            Declarator::Array(inner, size) => {
                let count = match size {
                    Some(expr) => self.const_eval(expr)? as u32,
                    None => 0,
                };
                self.apply_declarator(CType::Array(Box::new(base), count), inner)
            }
            Declarator::Func(_, _, _) => Err(CompileError::SemanticErrorNoIdent {
                reason: "function type in object position".to_string(),
            }),
        }
    }

    pub(crate) fn resolve_type_name(&self, ty: &TypeName) -> Result<CType, CompileError> {
        let base = self.resolve_specs(&ty.specs)?;
        self.apply_declarator(base, &ty.decl)
    }

    /// Compile-time constant evaluation, used for enum values, array sizes,
    /// case labels and global initializers.
    pub(crate) fn const_eval(&self, expr: &Expr) -> Result<i64, CompileError> {
        match expr {
            Expr::Int(tok) => parse_int_literal(&tok.text),
            Expr::Char(tok) => parse_char_literal(&tok.text),
            Expr::Ident(tok) => {
                if let Some(value) = self.enum_consts.get(&tok.text) {
                    return Ok(*value);
                }
                Err(CompileError::SemanticError {
                    ident: tok.text.clone(),
                    reason: "not a compile-time constant".to_string(),
                })
            }
            Expr::Paren(inner) => self.const_eval(inner),
            Expr::Cast(ty, inner) => {
                let value = self.const_eval(inner)?;
                let bits = self.resolve_type_name(ty)?.value_bits();
                Ok(truncate_value(value, bits))
            }
            Expr::SizeofType(ty) => Ok(self.resolve_type_name(ty)?.sizeof() as i64),
            Expr::Unary(op, inner) => {
                let value = self.const_eval(inner)?;
                match op {
                    UnOp::Plus => Ok(value),
                    UnOp::Minus => Ok(-value),
                    UnOp::BitNot => Ok(!value),
                    UnOp::LogNot => Ok((value == 0) as i64),
                    _ => Err(CompileError::SemanticErrorNoIdent {
                        reason: "not a compile-time constant".to_string(),
                    }),
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.const_eval(lhs)?;
                let r = self.const_eval(rhs)?;
                let value = match op {
                    BinOp::Add => l.wrapping_add(r),
                    BinOp::Sub => l.wrapping_sub(r),
                    BinOp::Mul => l.wrapping_mul(r),
                    BinOp::Div if r != 0 => l / r,
                    BinOp::Mod if r != 0 => l % r,
                    BinOp::Shl => l.wrapping_shl(r as u32),
                    BinOp::Shr => l.wrapping_shr(r as u32),
                    BinOp::BitAnd => l & r,
                    BinOp::BitOr => l | r,
                    BinOp::BitXor => l ^ r,
                    BinOp::Eq => (l == r) as i64,
                    BinOp::NotEq => (l != r) as i64,
                    BinOp::Lt => (l < r) as i64,
                    BinOp::LtEq => (l <= r) as i64,
                    BinOp::Gt => (l > r) as i64,
                    BinOp::GtEq => (l >= r) as i64,
                    BinOp::LogAnd => ((l != 0) && (r != 0)) as i64,
                    BinOp::LogOr => ((l != 0) || (r != 0)) as i64,
                    _ => {
                        return Err(CompileError::SemanticErrorNoIdent {
                            reason: "not a compile-time constant".to_string(),
                        });
                    }
                };
                Ok(value)
            }
            Expr::Ternary(cond, t, f) => {
                if self.const_eval(cond)? != 0 {
                    self.const_eval(t)
                } else {
                    self.const_eval(f)
                }
            }
            _ => Err(CompileError::SemanticErrorNoIdent {
                reason: "not a compile-time constant".to_string(),
            }),
        }
    }
}

pub(crate) fn truncate_value(value: i64, bits: u32) -> i64 {
    if bits >= 64 {
        return value;
    }
    value & ((1i64 << bits) - 1)
}

/// Decimal or hexadecimal integer literal, ignoring any `u`/`l` suffix.
pub(crate) fn parse_int_literal(text: &str) -> Result<i64, CompileError> {
    let trimmed = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let parsed = if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16)
    } else {
        trimmed.parse::<i64>()
    };
    parsed.map_err(|_| CompileError::SemanticError {
        ident: text.to_string(),
        reason: "invalid integer literal".to_string(),
    })
}

/// Character literal including the usual escapes.
pub(crate) fn parse_char_literal(text: &str) -> Result<i64, CompileError> {
    let inner = text
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .ok_or_else(|| CompileError::SemanticError {
            ident: text.to_string(),
            reason: "invalid character literal".to_string(),
        })?;
    let mut chars = inner.chars();
    let value = match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => b'\n' as i64,
            Some('t') => b'\t' as i64,
            Some('r') => b'\r' as i64,
            Some('0') => 0,
            Some('\\') => b'\\' as i64,
            Some('\'') => b'\'' as i64,
            Some('"') => b'"' as i64,
            _ => {
                return Err(CompileError::SemanticError {
                    ident: text.to_string(),
                    reason: "unsupported escape sequence".to_string(),
                });
            }
        },
        Some(c) => c as i64,
        None => {
            return Err(CompileError::SemanticError {
                ident: text.to_string(),
                reason: "empty character literal".to_string(),
            });
        }
    };
    Ok(value)
}

/// Decode a string literal body, processing escapes, without the
/// terminating NUL.
pub(crate) fn decode_string_literal(text: &str) -> Vec<u8> {
    let inner = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(text);
    let mut bytes = Vec::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('t') => bytes.push(b'\t'),
            Some('r') => bytes.push(b'\r'),
            Some('0') => bytes.push(0),
            Some('\\') => bytes.push(b'\\'),
            Some('"') => bytes.push(b'"'),
            Some('\'') => bytes.push(b'\''),
            Some(other) => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => break,
        }
    }
    bytes
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::super::tests::lower;
    use super::*;
    use crate::ir::{DataEntry, IrDecl};

    /// Lower a module and return the data block of one global, which makes
    /// the constant evaluator observable end to end.
    fn global_data(source: &str, name: &str) -> Vec<DataEntry> {
        let ir = lower(source).unwrap();
        ir.decls
            .iter()
            .find_map(|d| match d {
                IrDecl::Var(v) if v.ident == format!("@{}", name) => Some(v.data.clone()),
                _ => None,
            })
            .unwrap_or_else(|| panic!("global {} not found", name))
    }

    #[test]
    fn test_const_eval_arithmetic() {
        assert_eq!(
            global_data("int x = (3 + 4) * 2 - 1;", "x"),
            vec![DataEntry::Word(13)]
        );
    }

    #[test]
    fn test_const_eval_shifts_and_bitops() {
        assert_eq!(
            global_data("unsigned x = (1 << 4) | 3;", "x"),
            vec![DataEntry::Word(19)]
        );
        assert_eq!(
            global_data("unsigned y = 0xF0 >> 2;", "y"),
            vec![DataEntry::Word(60)]
        );
        assert_eq!(
            global_data("int z = 0xFF & ~0x0F;", "z"),
            vec![DataEntry::Word(0xF0)]
        );
    }

    #[test]
    fn test_const_eval_enum_constants() {
        assert_eq!(
            global_data("enum { A = 1, B, C = 10 }; int x = B + C;", "x"),
            vec![DataEntry::Word(12)]
        );
    }

    #[test]
    fn test_const_eval_sizes_array_by_enum() {
        // enum constants feed array sizes through the same evaluator
        let data = global_data("enum { N = 4 }; char buf[N * 2];", "buf");
        assert_eq!(data.len(), 8);
        assert!(data.iter().all(|e| *e == DataEntry::Byte(0)));
    }

    #[test]
    fn test_const_eval_sizeof() {
        assert_eq!(
            global_data("int s = sizeof(long);", "s"),
            vec![DataEntry::Word(4)]
        );
        assert_eq!(
            global_data("int t = sizeof(int[3]);", "t"),
            vec![DataEntry::Word(6)]
        );
    }

    #[test]
    fn test_const_eval_cast_truncates() {
        assert_eq!(
            global_data("int x = (char)0x1FF;", "x"),
            vec![DataEntry::Word(0xFF)]
        );
    }

    #[test]
    fn test_const_eval_ternary_and_logical() {
        assert_eq!(
            global_data("int x = 2 > 1 ? 7 : 9;", "x"),
            vec![DataEntry::Word(7)]
        );
        assert_eq!(
            global_data("int y = 0 || 2;", "y"),
            vec![DataEntry::Word(1)]
        );
        assert_eq!(
            global_data("int z = 3 && 0;", "z"),
            vec![DataEntry::Word(0)]
        );
    }

    #[test]
    fn test_const_eval_char_literals() {
        assert_eq!(
            global_data("int c = 'A' + 1;", "c"),
            vec![DataEntry::Word(66)]
        );
        assert_eq!(
            global_data("int n = '\\n';", "n"),
            vec![DataEntry::Word(10)]
        );
    }

    #[test]
    fn test_const_eval_rejects_non_constant() {
        let err = lower("int g; int x = g + 1;").unwrap_err();
        match err {
            CompileError::SemanticError { ident, reason } => {
                assert_eq!(ident, "g");
                assert!(reason.contains("not a compile-time constant"));
            }
            other => panic!("expected semantic error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_int_literal_forms() {
        assert_eq!(parse_int_literal("42").unwrap(), 42);
        assert_eq!(parse_int_literal("0x2A").unwrap(), 42);
        assert_eq!(parse_int_literal("0X10").unwrap(), 16);
        assert_eq!(parse_int_literal("10u").unwrap(), 10);
        assert_eq!(parse_int_literal("0xFFul").unwrap(), 255);
        assert!(parse_int_literal("12ab").is_err());
    }

    #[test]
    fn test_parse_char_literal_escapes() {
        assert_eq!(parse_char_literal("'A'").unwrap(), 65);
        assert_eq!(parse_char_literal("'\\n'").unwrap(), 10);
        assert_eq!(parse_char_literal("'\\0'").unwrap(), 0);
        assert_eq!(parse_char_literal("'\\''").unwrap(), 39);
        assert!(parse_char_literal("''").is_err());
    }

    #[test]
    fn test_decode_string_literal_escapes() {
        assert_eq!(decode_string_literal("\"hi\\n\""), b"hi\n");
        assert_eq!(decode_string_literal("\"a\\\\b\""), b"a\\b");
        assert_eq!(decode_string_literal("\"\\0\""), vec![0]);
    }

    #[test]
    fn test_truncate_value() {
        assert_eq!(truncate_value(0x1FF, 8), 0xFF);
        assert_eq!(truncate_value(-1, 16), 0xFFFF);
        assert_eq!(truncate_value(5, 64), 5);
    }

    #[test]
    fn test_value_bits_and_signs() {
        assert_eq!(CType::int16().value_bits(), 16);
        assert!(CType::int16().is_signed());
        let ptr = CType::Ptr(Box::new(CType::Void));
        assert_eq!(ptr.value_bits(), 16);
        assert!(!ptr.is_signed());
        let arr = CType::Array(Box::new(CType::Int { bits: 8, signed: true }), 5);
        assert_eq!(arr.value_bits(), 16);
        assert_eq!(arr.sizeof(), 5);
    }
}
