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

pub mod ast;
pub mod errors;
pub mod file_reader;
pub mod ir;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod z80;

use anyhow::{Context, Result};
use file_reader::FileReader;
use ir::IrModule;
use std::path::Path;

/// Compile a C-dialect source text into Z80 assembly.
pub fn compile_source(source: &str) -> Result<String> {
    compile_source_config(source, 0)
}

/// Same as [`compile_source`] with the parser's allowance for extra macro
/// decoration identifiers in declaration specifiers.
pub fn compile_source_config(source: &str, extra_type_idents: usize) -> Result<String> {
    let tokens = lexer::lex(source);

    let module = parser::parse_module_config(&tokens, extra_type_idents)
        .context("Failed during parsing stage")?;

    let ir = lower::lower_module(&module).context("Failed during lowering stage")?;

    let vcode =
        z80::isel::select_module(&ir).context("Failed during instruction selection stage")?;

    let code = z80::ralloc::allocate_module(&vcode);

    Ok(z80::emit::emit_module(&code))
}

/// Lex, parse and lower only; used by the IR dump.
pub fn lower_to_ir(source: &str) -> Result<IrModule> {
    let tokens = lexer::lex(source);
    let module = parser::parse_module(&tokens).context("Failed during parsing stage")?;
    lower::lower_module(&module).context("Failed during lowering stage")
}

/// Lex and parse only; used by the AST dump.
pub fn parse_to_ast(source: &str) -> Result<ast::Module> {
    let tokens = lexer::lex(source);
    parser::parse_module(&tokens).context("Failed during parsing stage")
}

pub fn compile<F: FileReader>(source_path: &Path, reader: &F) -> Result<String> {
    let source = reader.read_to_string(source_path)?;
    compile_source(&source)
}
