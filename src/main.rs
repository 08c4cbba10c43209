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

use anyhow::{Context, Result};
use clap::Parser as clap_parser;
use std::fs;
use std::path::PathBuf;
use zedc::file_reader::{FileReader, SourceFileReader};

#[derive(clap_parser)]
#[clap(version = "0.1.0", about = "C compiler targeting the Z80")]
struct Opts {
    #[clap(short, long)]
    input: PathBuf,
    /// Output assembly file; defaults to the input with an .asm extension
    #[clap(short, long)]
    output: Option<PathBuf>,
    /// Print the lowered IR module as JSON and exit
    #[clap(long)]
    dump_ir: bool,
    /// Print the parsed AST and exit
    #[clap(long)]
    dump_ast: bool,
    /// Identifiers tolerated after a type specifier, for macro-decorated
    /// declarations
    #[clap(long, default_value_t = 0)]
    extra_decl_idents: usize,
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    let reader = SourceFileReader;
    let source = reader
        .read_to_string(&opts.input)
        .with_context(|| format!("Failed to read input file: {}", opts.input.display()))?;

    if opts.dump_ast {
        let module = zedc::parse_to_ast(&source)?;
        println!("{:#?}", module);
        return Ok(());
    }

    if opts.dump_ir {
        let ir = zedc::lower_to_ir(&source)?;
        println!("{}", serde_json::to_string_pretty(&ir)?);
        return Ok(());
    }

    let assembly = zedc::compile_source_config(&source, opts.extra_decl_idents)?;

    let output = opts
        .output
        .unwrap_or_else(|| opts.input.with_extension("asm"));
    fs::write(&output, assembly)?;
    println!(
        "Successfully compiled {} to {}",
        opts.input.display(),
        output.display()
    );

    Ok(())
}
