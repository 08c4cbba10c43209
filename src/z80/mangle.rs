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

//! Pure mappings from IR identifiers (`@global`, `%local`) to Z80 symbols.
//! Each identifier class has exactly one mangling so collisions stay
//! diagnosable.

/// `@name` becomes `_name`.
pub fn mangle_global(ident: &str) -> String {
    format!("_{}", ident.strip_prefix('@').unwrap_or(ident))
}

/// Label `%lbl` in procedure `@p` becomes `l_p_lbl`; the internal end
/// marker `%@end` becomes `e_p_end`.
pub fn mangle_label(proc_ident: &str, label: &str) -> String {
    let proc_name = proc_ident.strip_prefix('@').unwrap_or(proc_ident);
    let label_name = label.strip_prefix('%').unwrap_or(label);
    if label_name == "@end" {
        return format!("e_{}_end", proc_name);
    }
    format!("l_{}_{}", proc_name, label_name.replace('@', "_"))
}

/// Local variable `%v` in procedure `@p` becomes `v_p_v`; embedded `@`
/// characters from scope shadowing are replaced with `_`.
pub fn mangle_lvar(proc_ident: &str, lvar: &str) -> String {
    let proc_name = proc_ident.strip_prefix('@').unwrap_or(proc_ident);
    let lvar_name = lvar.strip_prefix('%').unwrap_or(lvar);
    format!("v_{}_{}", proc_name, lvar_name.replace('@', "_"))
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle_global() {
        assert_eq!(mangle_global("@main"), "_main");
        assert_eq!(mangle_global("@_strlit0"), "__strlit0");
    }

    #[test]
    fn test_mangle_label() {
        assert_eq!(mangle_label("@f", "%wtest0"), "l_f_wtest0");
        assert_eq!(mangle_label("@f", "%@end"), "e_f_end");
    }

    #[test]
    fn test_mangle_lvar() {
        assert_eq!(mangle_lvar("@f", "%x"), "v_f_x");
        assert_eq!(mangle_lvar("@f", "%x@2"), "v_f_x_2");
    }
}
