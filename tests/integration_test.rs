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

use std::path::Path;
use zedc::compile;
use zedc::compile_source;
use zedc::file_reader::MockFileReader;

fn lines_of(asm: &str) -> Vec<String> {
    asm.lines().map(|l| l.trim().to_string()).collect()
}

#[test]
fn test_compile_minimal_function() {
    let asm = compile_source("int f(void) { return 1 + 2 * 3; }").unwrap();
    let lines = lines_of(&asm);
    assert_eq!(lines[0], "_f:");
    assert_eq!(lines[1], "push IX");
    // the function returns through BC with a full epilogue
    assert!(lines.contains(&"ld SP, IX".to_string()));
    assert!(lines.contains(&"pop IX".to_string()));
    assert!(lines.contains(&"ret".to_string()));
}

#[test]
fn test_first_ret_follows_epilogue() {
    let asm = compile_source("void f(void) { }").unwrap();
    let lines = lines_of(&asm);
    let ret_at = lines.iter().position(|l| l == "ret").unwrap();
    assert_eq!(lines[ret_at - 1], "pop IX");
    assert_eq!(lines[ret_at - 2], "ld SP, IX");
}

#[test]
fn test_no_virtual_operands_in_output() {
    let asm = compile_source(
        "int mul(int a, int b) { return a * b; }
         int shift(int a, int n) { return a << n; }
         unsigned cmp(unsigned a, unsigned b) { return a < b; }",
    )
    .unwrap();
    assert!(!asm.contains('%'), "virtual register leaked:\n{}", asm);
    assert!(!asm.contains("SFB"), "frame anchor leaked:\n{}", asm);
    assert!(!asm.contains("SFE"), "frame anchor leaked:\n{}", asm);
}

#[test]
fn test_add16_uses_carry_chain() {
    let asm = compile_source("int add(int a, int b) { return a + b; }").unwrap();
    // byte 0 adds, byte 1 adds with carry
    assert!(asm.contains("add A, (IX"));
    assert!(asm.contains("adc A, (IX"));
    assert!(asm.contains("ld C, (IX"));
    assert!(asm.contains("ld B, (IX"));
}

#[test]
fn test_call_with_three_word_args_needs_no_stack() {
    let source = "int g(int x, int y, int z);
                  int h(void) { return g(1, 2, 3); }";
    let asm = compile_source(source).unwrap();
    assert!(asm.contains("call _g"));
    assert!(!asm.contains("inc SP"));
}

#[test]
fn test_call_with_four_word_args_cleans_stack() {
    let source = "int g(int x, int y, int z, int w);
                  int h(void) { return g(1, 2, 3, 4); }";
    let asm = compile_source(source).unwrap();
    assert!(asm.contains("call _g"));
    assert!(asm.contains("push HL"));
    let count = asm.lines().filter(|l| l.trim() == "inc SP").count();
    assert_eq!(count, 2);
}

#[test]
fn test_global_data_directives() {
    let source = "int x = 7; unsigned char c = 65; long big = 100000; long long huge = 5;";
    let asm = compile_source(source).unwrap();
    let lines = lines_of(&asm);
    let x_at = lines.iter().position(|l| l == "_x:").unwrap();
    assert_eq!(lines[x_at + 1], "defw 7");
    let c_at = lines.iter().position(|l| l == "_c:").unwrap();
    assert_eq!(lines[c_at + 1], "defb 65");
    let big_at = lines.iter().position(|l| l == "_big:").unwrap();
    assert_eq!(lines[big_at + 1], "defdw 100000");
    let huge_at = lines.iter().position(|l| l == "_huge:").unwrap();
    assert_eq!(lines[huge_at + 1], "defqw 5");
}

#[test]
fn test_global_pointer_references_symbol() {
    let asm = compile_source("int target; int *p = &target;").unwrap();
    let lines = lines_of(&asm);
    let p_at = lines.iter().position(|l| l == "_p:").unwrap();
    assert_eq!(lines[p_at + 1], "defw _target");
}

#[test]
fn test_string_literal_data() {
    let asm = compile_source("const char *msg = \"Hi\";").unwrap();
    let lines = lines_of(&asm);
    let msg_at = lines.iter().position(|l| l == "_msg:").unwrap();
    assert_eq!(lines[msg_at + 1], "defw __strlit0");
    let lit_at = lines.iter().position(|l| l == "__strlit0:").unwrap();
    assert_eq!(lines[lit_at + 1], "defb 72");
    assert_eq!(lines[lit_at + 2], "defb 105");
    assert_eq!(lines[lit_at + 3], "defb 0");
}

#[test]
fn test_control_flow_labels_are_mangled() {
    let source = "int count(int n) {
                      int total = 0;
                      while (n) { total = total + n; n = n - 1; }
                      return total;
                  }";
    let asm = compile_source(source).unwrap();
    assert!(asm.contains("l_count_wtest"));
    assert!(asm.contains("l_count_wend"));
    assert!(asm.contains("e_count_end:"));
}

#[test]
fn test_goto_label_mangling() {
    let source = "void spin(void) { again: goto again; }";
    let asm = compile_source(source).unwrap();
    assert!(asm.contains("l_spin_again:"));
    assert!(asm.contains("jp l_spin_again"));
}

#[test]
fn test_syntax_error_names_token() {
    let err = compile_source("int f(void) { return 1 + ; }").unwrap_err();
    let text = format!("{:#}", err);
    assert!(text.contains("unexpected"), "got: {}", text);
    assert!(text.contains("';'") || text.contains(";"), "got: {}", text);
}

#[test]
fn test_undefined_call_is_semantic_error() {
    let err = compile_source("int f(void) { return missing(); }").unwrap_err();
    let text = format!("{:#}", err);
    assert!(text.contains("missing"), "got: {}", text);
}

#[test]
fn test_arity_mismatch_is_semantic_error() {
    let source = "int g(int a); int f(void) { return g(1, 2); }";
    let err = compile_source(source).unwrap_err();
    let text = format!("{:#}", err);
    assert!(text.contains("argument count"), "got: {}", text);
}

#[test]
fn test_compile_through_file_reader() {
    let mut reader = MockFileReader::default();
    reader.add_file("prog.c", "int main(void) { return 0; }");

    let asm = compile(Path::new("prog.c"), &reader).unwrap();
    assert!(asm.starts_with("_main:"));
}

#[test]
fn test_missing_file_is_an_error() {
    let reader = MockFileReader::default();
    let err = compile(Path::new("nope.c"), &reader).unwrap_err();
    assert!(format!("{:#}", err).contains("nope.c"));
}

#[test]
fn test_compile_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blink.c");
    std::fs::write(&path, "int on; void toggle(void) { on = !on; }").unwrap();

    let reader = zedc::file_reader::SourceFileReader;
    let asm = compile(&path, &reader).unwrap();
    assert!(asm.contains("_toggle:"));
    assert!(asm.contains("_on:"));
}

#[test]
fn test_larger_program_compiles() {
    let source = "
        int fib(int n) {
            int a = 0;
            int b = 1;
            while (n > 0) {
                int t = a + b;
                a = b;
                b = t;
                n = n - 1;
            }
            return a;
        }

        unsigned int checksum(const char *data, int len) {
            unsigned int sum = 0;
            int i;
            for (i = 0; i < len; i = i + 1)
                sum = sum + (unsigned char)data[i];
            return sum;
        }

        int dispatch(int op, int a, int b) {
            switch (op) {
            case 0: return a + b;
            case 1: return a - b;
            case 2: return a * b;
            default: break;
            }
            return fib(a) ? 1 : 0;
        }
    ";
    let asm = compile_source(source).unwrap();
    assert!(asm.contains("_fib:"));
    assert!(asm.contains("_checksum:"));
    assert!(asm.contains("_dispatch:"));
    assert!(!asm.contains('%'));
}
