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

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CompileError {
    #[error("{line}:{col}: '{token}' unexpected, expected {expected}")]
    SyntaxError {
        line: usize,
        col: usize,
        token: String,
        expected: String,
    },

    #[error("Semantic Error in '{ident}': {reason}")]
    SemanticError { ident: String, reason: String },

    #[error("Semantic Error: {reason}")]
    SemanticErrorNoIdent { reason: String },
}
