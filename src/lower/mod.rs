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

//! Lowering from the AST to the three-address IR.
//!
//! C parameters and locals are given memory homes in the procedure's local
//! variable area and accessed through `lvarptr` + `read`/`write`; globals go
//! through `varptr`. Intermediate values are numbered pseudo-variables.

mod ctype;
mod expr;

pub(crate) use ctype::CType;

use crate::ast::*;
use crate::errors::CompileError;
use crate::ir::*;
use ctype::{decode_string_literal, truncate_value};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub(crate) struct ProcSig {
    pub params: Vec<CType>,
    pub ret: CType,
    pub variadic: bool,
}

pub struct Lowerer {
    pub(crate) typedefs: HashMap<String, CType>,
    pub(crate) enum_consts: HashMap<String, i64>,
    pub(crate) globals: HashMap<String, CType>,
    pub(crate) procs: HashMap<String, ProcSig>,
    str_count: u32,
    str_vars: Vec<IrVar>,
}

/// Per-procedure lowering state.
pub(crate) struct ProcCtx {
    pub proc: IrProc,
    scopes: Vec<HashMap<String, (String, CType)>>,
    shadow_count: u32,
    next_value: u32,
    next_label: u32,
    next_tmp: u32,
    break_labels: Vec<String>,
    continue_labels: Vec<String>,
    pub ret: CType,
}

impl ProcCtx {
    fn new(ident: &str, ret: CType) -> Self {
        ProcCtx {
            proc: IrProc::new(ident),
            scopes: vec![HashMap::new()],
            shadow_count: 0,
            next_value: 0,
            next_label: 0,
            next_tmp: 0,
            break_labels: Vec::new(),
            continue_labels: Vec::new(),
            ret,
        }
    }

    pub fn push(&mut self, instr: IrInstr) {
        self.proc.body.push(instr);
    }

    pub fn label(&mut self, label: &str) {
        self.proc.body.push_label(label);
    }

    /// Fresh numbered pseudo-variable.
    pub fn new_value(&mut self) -> String {
        let name = format!("%{}", self.next_value);
        self.next_value += 1;
        name
    }

    /// Fresh label from a pattern stem.
    pub fn new_label(&mut self, stem: &str) -> String {
        let name = format!("%{}{}", stem, self.next_label);
        self.next_label += 1;
        name
    }

    /// Fresh compiler scratch local.
    pub fn new_tmp(&mut self, ty: &CType) -> String {
        let name = format!("%_t{}", self.next_tmp);
        self.next_tmp += 1;
        self.proc.lvars.push(IrProcLvar {
            name: name.clone(),
            ty: ty.to_ir(),
        });
        name
    }

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    /// Register a local variable in the current scope. Shadowed names get an
    /// `@N` suffix in their IR identifier so every local is unique within
    /// the procedure.
    pub fn declare_local(&mut self, name: &str, ty: &CType) -> String {
        let already_known = self
            .scopes
            .iter()
            .any(|scope| scope.contains_key(name));
        let ir_name = if already_known {
            self.shadow_count += 1;
            format!("%{}@{}", name, self.shadow_count)
        } else {
            format!("%{}", name)
        };
        self.proc.lvars.push(IrProcLvar {
            name: ir_name.clone(),
            ty: ty.to_ir(),
        });
        self.scopes
            .last_mut()
            .unwrap()
            .insert(name.to_string(), (ir_name.clone(), ty.clone()));
        ir_name
    }

    pub fn lookup_local(&self, name: &str) -> Option<(String, CType)> {
        for scope in self.scopes.iter().rev() {
            if let Some(entry) = scope.get(name) {
                return Some(entry.clone());
            }
        }
        None
    }

    fn push_loop(&mut self, break_label: &str, continue_label: &str) {
        self.break_labels.push(break_label.to_string());
        self.continue_labels.push(continue_label.to_string());
    }

    fn pop_loop(&mut self) {
        self.break_labels.pop();
        self.continue_labels.pop();
    }
}

/// Lower a parsed module to an IR module.
pub fn lower_module(module: &Module) -> Result<IrModule, CompileError> {
    let mut lowerer = Lowerer {
        typedefs: HashMap::new(),
        enum_consts: HashMap::new(),
        globals: HashMap::new(),
        procs: HashMap::new(),
        str_count: 0,
        str_vars: Vec::new(),
    };
    lowerer.lower(module)
}

impl Lowerer {
    fn lower(&mut self, module: &Module) -> Result<IrModule, CompileError> {
        // first pass: signatures, typedefs, enum constants, global types
        for decl in &module.decls {
            self.collect_global(decl)?;
        }

        let mut ir = IrModule::default();
        for decl in &module.decls {
            match decl {
                GlobalDecl::FuncDef { decl, body, .. } => {
                    let proc = self.lower_func(decl, body)?;
                    ir.decls.push(IrDecl::Proc(proc));
                }
                GlobalDecl::Decl(decl) => {
                    self.lower_global_decl(decl, &mut ir)?;
                }
                GlobalDecl::Macro(_) => {
                    return Err(CompileError::SemanticErrorNoIdent {
                        reason: "global macro declarations cannot be lowered".to_string(),
                    });
                }
            }
        }

        // string literal data collected while lowering bodies
        for var in self.str_vars.drain(..) {
            ir.decls.push(IrDecl::Var(var));
        }

        Ok(ir)
    }

    // --- first pass ---

    fn collect_global(&mut self, decl: &GlobalDecl) -> Result<(), CompileError> {
        match decl {
            GlobalDecl::FuncDef { specs, decl, .. } => {
                self.collect_enums(specs)?;
                let sig = self.func_signature(specs, decl)?;
                let name = decl.ident().unwrap().text.clone();
                self.procs.insert(name, sig);
                Ok(())
            }
            GlobalDecl::Decl(declaration) => {
                self.collect_enums(&declaration.specs)?;
                let is_typedef = declaration.specs.has_storage_class("typedef");
                for init_decl in &declaration.decls {
                    let name = match init_decl.decl.ident() {
                        Some(tok) => tok.text.clone(),
                        None => continue,
                    };
                    if is_typedef {
                        let base = self.resolve_specs(&declaration.specs)?;
                        let ty = self.apply_declarator(base, &init_decl.decl)?;
                        self.typedefs.insert(name, ty);
                    } else if init_decl.decl.is_function() {
                        let sig = self.func_signature(&declaration.specs, &init_decl.decl)?;
                        self.procs.entry(name).or_insert(sig);
                    } else {
                        let base = self.resolve_specs(&declaration.specs)?;
                        let ty = self.apply_declarator(base, &init_decl.decl)?;
                        self.globals.insert(name, ty);
                    }
                }
                Ok(())
            }
            GlobalDecl::Macro(_) => Ok(()),
        }
    }

    fn collect_enums(&mut self, specs: &DeclSpecs) -> Result<(), CompileError> {
        for item in &specs.items {
            let DeclSpec::TypeSpec(TypeSpec::Enum(spec)) = item else {
                continue;
            };
            let Some(elems) = &spec.elems else { continue };
            let mut next = 0i64;
            for elem in elems {
                let value = match &elem.value {
                    Some(expr) => self.const_eval(expr)?,
                    None => next,
                };
                self.enum_consts.insert(elem.name.text.clone(), value);
                next = value + 1;
            }
        }
        Ok(())
    }

    fn func_signature(
        &self,
        specs: &DeclSpecs,
        decl: &Declarator,
    ) -> Result<ProcSig, CompileError> {
        let base = self.resolve_specs(specs)?;
        // pointer layers outside the function layer shape the return type
        let ret = Self::func_return_type(base, decl);
        let (params, variadic) = Self::func_params(decl).ok_or_else(|| {
            CompileError::SemanticError {
                ident: decl.ident().map(|t| t.text.clone()).unwrap_or_default(),
                reason: "not a function declarator".to_string(),
            }
        })?;
        let mut param_types = Vec::new();
        for param in params {
            let base = self.resolve_specs(&param.specs)?;
            let ty = self.apply_declarator(base, &param.decl)?;
            // array parameters decay to pointers
            let ty = match ty {
                CType::Array(elem, _) => CType::Ptr(elem),
                other => other,
            };
            if !matches!(ty, CType::Void) {
                param_types.push(ty);
            }
        }
        Ok(ProcSig {
            params: param_types,
            ret,
            variadic,
        })
    }

    fn func_params(decl: &Declarator) -> Option<(&[ParamDecl], bool)> {
        match decl {
            Declarator::Func(_, params, variadic) => Some((params, *variadic)),
            Declarator::Paren(inner) | Declarator::Ptr(_, inner) => Self::func_params(inner),
            _ => None,
        }
    }

    fn func_return_type(base: CType, decl: &Declarator) -> CType {
        match decl {
            Declarator::Ptr(_, inner) => {
                Self::func_return_type(CType::Ptr(Box::new(base)), inner)
            }
            Declarator::Paren(inner) => Self::func_return_type(base, inner),
            _ => base,
        }
    }

    // --- functions ---

    fn lower_func(&mut self, decl: &Declarator, body: &Block) -> Result<IrProc, CompileError> {
        let name = decl.ident().unwrap().text.clone();
        let sig = self.procs.get(&name).unwrap().clone();
        let (params, _) = Self::func_params(decl).unwrap();

        let mut ctx = ProcCtx::new(&format!("@{}", name), sig.ret.clone());
        ctx.proc.is_variadic = sig.variadic;

        // named arguments first, then a memory home for each so that the
        // body can take their address and assign to them
        let mut homes = Vec::new();
        for (param, ty) in params.iter().zip(sig.params.iter()) {
            let pname = match param.decl.ident() {
                Some(tok) => tok.text.clone(),
                None => {
                    return Err(CompileError::SemanticError {
                        ident: name.clone(),
                        reason: "unnamed parameter in function definition".to_string(),
                    });
                }
            };
            let arg_name = format!("%{}", pname);
            ctx.proc.args.push(IrProcArg {
                name: arg_name.clone(),
                ty: ty.to_ir(),
            });
            homes.push((pname, arg_name, ty.clone()));
        }
        for (pname, arg_name, ty) in homes {
            let home = ctx.declare_local(&pname, &ty);
            let addr = ctx.new_value();
            ctx.push(
                IrInstr::new(IrOp::Lvarptr, 16)
                    .with_dest(IrOper::var(&addr))
                    .with_op1(IrOper::var(&home)),
            );
            ctx.push(
                IrInstr::new(IrOp::Write, ty.value_bits())
                    .with_op1(IrOper::var(&addr))
                    .with_op2(IrOper::var(&arg_name)),
            );
        }

        self.lower_block(&mut ctx, body)?;

        // fallthrough return
        ctx.label("%@end");
        ctx.push(IrInstr::new(IrOp::Ret, 0));

        Ok(ctx.proc)
    }

    fn lower_block(&mut self, ctx: &mut ProcCtx, block: &Block) -> Result<(), CompileError> {
        ctx.enter_scope();
        let result = block
            .stmts
            .iter()
            .try_for_each(|stmt| self.lower_stmt(ctx, stmt));
        ctx.exit_scope();
        result
    }

    // --- statements ---

    fn lower_stmt(&mut self, ctx: &mut ProcCtx, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Block(block) => self.lower_block(ctx, block),
            Stmt::Null => Ok(()),
            Stmt::Expr(expr) => {
                self.lower_expr(ctx, expr)?;
                Ok(())
            }
            Stmt::Decl(decl) => self.lower_local_decl(ctx, decl),
            Stmt::Return(value) => self.lower_return(ctx, value.as_ref()),
            Stmt::If {
                cond,
                then_block,
                elifs,
                else_block,
            } => self.lower_if(ctx, cond, then_block, elifs, else_block.as_ref()),
            Stmt::While { cond, body } => self.lower_while(ctx, cond, body),
            Stmt::DoWhile { body, cond } => self.lower_do_while(ctx, body, cond),
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => self.lower_for(ctx, init, cond.as_ref(), step.as_ref(), body),
            Stmt::Switch { cond, body } => self.lower_switch(ctx, cond, body),
            Stmt::Break => match ctx.break_labels.last() {
                Some(label) => {
                    let label = label.clone();
                    self.emit_jmp(ctx, &label);
                    Ok(())
                }
                None => Err(CompileError::SemanticError {
                    ident: ctx.proc.ident.clone(),
                    reason: "break outside of a loop or switch".to_string(),
                }),
            },
            Stmt::Continue => match ctx.continue_labels.last() {
                Some(label) => {
                    let label = label.clone();
                    self.emit_jmp(ctx, &label);
                    Ok(())
                }
                None => Err(CompileError::SemanticError {
                    ident: ctx.proc.ident.clone(),
                    reason: "continue outside of a loop".to_string(),
                }),
            },
            Stmt::Goto(target) => {
                let label = format!("%{}", target.text);
                self.emit_jmp(ctx, &label);
                Ok(())
            }
            Stmt::Label(name) => {
                ctx.label(&format!("%{}", name.text));
                Ok(())
            }
            Stmt::Case(_) | Stmt::Default => Err(CompileError::SemanticError {
                ident: ctx.proc.ident.clone(),
                reason: "case label outside of a switch body".to_string(),
            }),
            Stmt::LoopMacro { .. } => Err(CompileError::SemanticError {
                ident: ctx.proc.ident.clone(),
                reason: "loop macro invocations cannot be lowered".to_string(),
            }),
            Stmt::Asm(_) => Err(CompileError::SemanticError {
                ident: ctx.proc.ident.clone(),
                reason: "inline assembly cannot be lowered".to_string(),
            }),
        }
    }

    fn lower_local_decl(&mut self, ctx: &mut ProcCtx, decl: &Declaration) -> Result<(), CompileError> {
        if decl.specs.has_storage_class("typedef") {
            return Err(CompileError::SemanticError {
                ident: ctx.proc.ident.clone(),
                reason: "local typedef is not supported".to_string(),
            });
        }
        let base = self.resolve_specs(&decl.specs)?;
        for init_decl in &decl.decls {
            let name = match init_decl.decl.ident() {
                Some(tok) => tok.text.clone(),
                None => continue,
            };
            let ty = self.apply_declarator(base.clone(), &init_decl.decl)?;
            let home = ctx.declare_local(&name, &ty);
            if let Some(init) = &init_decl.init {
                let value = match init {
                    Init::Expr(expr) => self.lower_expr(ctx, expr)?,
                    Init::List(_) => {
                        return Err(CompileError::SemanticError {
                            ident: name,
                            reason: "initializer lists on locals are not supported".to_string(),
                        });
                    }
                };
                let value = self.convert_value(ctx, value, &ty)?;
                let addr = ctx.new_value();
                ctx.push(
                    IrInstr::new(IrOp::Lvarptr, 16)
                        .with_dest(IrOper::var(&addr))
                        .with_op1(IrOper::var(&home)),
                );
                ctx.push(
                    IrInstr::new(IrOp::Write, ty.value_bits())
                        .with_op1(IrOper::var(&addr))
                        .with_op2(IrOper::var(&value.0)),
                );
            }
        }
        Ok(())
    }

    fn lower_return(
        &mut self,
        ctx: &mut ProcCtx,
        value: Option<&Expr>,
    ) -> Result<(), CompileError> {
        match value {
            Some(expr) => {
                let ret_ty = ctx.ret.clone();
                let value = self.lower_expr(ctx, expr)?;
                let value = self.convert_value(ctx, value, &ret_ty)?;
                ctx.push(
                    IrInstr::new(IrOp::Retv, ret_ty.value_bits()).with_op1(IrOper::var(&value.0)),
                );
            }
            None => {
                ctx.push(IrInstr::new(IrOp::Ret, 0));
            }
        }
        Ok(())
    }

    fn lower_if(
        &mut self,
        ctx: &mut ProcCtx,
        cond: &Expr,
        then_block: &Block,
        elifs: &[(Expr, Block)],
        else_block: Option<&Block>,
    ) -> Result<(), CompileError> {
        let end = ctx.new_label("ifend");

        let mut arms: Vec<(&Expr, &Block)> = vec![(cond, then_block)];
        arms.extend(elifs.iter().map(|(c, b)| (c, b)));

        for (arm_cond, arm_block) in arms {
            let next = ctx.new_label("ifnext");
            let cond_var = self.lower_cond(ctx, arm_cond)?;
            ctx.push(
                IrInstr::new(IrOp::Jz, 16)
                    .with_op1(IrOper::var(&cond_var))
                    .with_op2(IrOper::var(&next)),
            );
            self.lower_block(ctx, arm_block)?;
            self.emit_jmp(ctx, &end);
            ctx.label(&next);
        }

        if let Some(block) = else_block {
            self.lower_block(ctx, block)?;
        }
        ctx.label(&end);
        Ok(())
    }

    fn lower_while(
        &mut self,
        ctx: &mut ProcCtx,
        cond: &Expr,
        body: &Block,
    ) -> Result<(), CompileError> {
        let head = ctx.new_label("wtest");
        let end = ctx.new_label("wend");

        ctx.label(&head);
        let cond_var = self.lower_cond(ctx, cond)?;
        ctx.push(
            IrInstr::new(IrOp::Jz, 16)
                .with_op1(IrOper::var(&cond_var))
                .with_op2(IrOper::var(&end)),
        );
        ctx.push_loop(&end, &head);
        let result = self.lower_block(ctx, body);
        ctx.pop_loop();
        result?;
        self.emit_jmp(ctx, &head);
        ctx.label(&end);
        Ok(())
    }

    fn lower_do_while(
        &mut self,
        ctx: &mut ProcCtx,
        body: &Block,
        cond: &Expr,
    ) -> Result<(), CompileError> {
        let head = ctx.new_label("dhead");
        let test = ctx.new_label("dtest");
        let end = ctx.new_label("dend");

        ctx.label(&head);
        ctx.push_loop(&end, &test);
        let result = self.lower_block(ctx, body);
        ctx.pop_loop();
        result?;
        ctx.label(&test);
        let cond_var = self.lower_cond(ctx, cond)?;
        ctx.push(
            IrInstr::new(IrOp::Jnz, 16)
                .with_op1(IrOper::var(&cond_var))
                .with_op2(IrOper::var(&head)),
        );
        ctx.label(&end);
        Ok(())
    }

    fn lower_for(
        &mut self,
        ctx: &mut ProcCtx,
        init: &ForInit,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Block,
    ) -> Result<(), CompileError> {
        ctx.enter_scope();
        match init {
            ForInit::Decl(decl) => self.lower_local_decl(ctx, decl)?,
            ForInit::Expr(expr) => {
                self.lower_expr(ctx, expr)?;
            }
            ForInit::None => {}
        }

        let head = ctx.new_label("ftest");
        let next = ctx.new_label("fnext");
        let end = ctx.new_label("fend");

        ctx.label(&head);
        if let Some(cond) = cond {
            let cond_var = self.lower_cond(ctx, cond)?;
            ctx.push(
                IrInstr::new(IrOp::Jz, 16)
                    .with_op1(IrOper::var(&cond_var))
                    .with_op2(IrOper::var(&end)),
            );
        }
        ctx.push_loop(&end, &next);
        let result = self.lower_block(ctx, body);
        ctx.pop_loop();
        result?;
        ctx.label(&next);
        if let Some(step) = step {
            self.lower_expr(ctx, step)?;
        }
        self.emit_jmp(ctx, &head);
        ctx.label(&end);
        ctx.exit_scope();
        Ok(())
    }

    /// A switch lowers to a chain of equality tests against the collected
    /// top-level case labels, then the body with those labels materialized.
    fn lower_switch(
        &mut self,
        ctx: &mut ProcCtx,
        cond: &Expr,
        body: &Block,
    ) -> Result<(), CompileError> {
        let end = ctx.new_label("swend");
        let (cond_var, cond_ty) = self.lower_expr(ctx, cond)?;
        let width = cond_ty.value_bits().max(16);

        // collect the dispatch table
        let mut cases = Vec::new();
        let mut default_label = None;
        for stmt in &body.stmts {
            match stmt {
                Stmt::Case(expr) => {
                    let value = self.const_eval(expr)?;
                    cases.push((value, ctx.new_label("case")));
                }
                Stmt::Default => {
                    default_label = Some(ctx.new_label("default"));
                }
                _ => {}
            }
        }

        for (value, label) in &cases {
            let imm = ctx.new_value();
            ctx.push(
                IrInstr::new(IrOp::Imm, width)
                    .with_dest(IrOper::var(&imm))
                    .with_op1(IrOper::Imm(*value)),
            );
            let test = ctx.new_value();
            ctx.push(
                IrInstr::new(IrOp::Eq, width)
                    .with_dest(IrOper::var(&test))
                    .with_op1(IrOper::var(&cond_var))
                    .with_op2(IrOper::var(&imm)),
            );
            ctx.push(
                IrInstr::new(IrOp::Jnz, 16)
                    .with_op1(IrOper::var(&test))
                    .with_op2(IrOper::var(label)),
            );
        }
        match &default_label {
            Some(label) => self.emit_jmp(ctx, label),
            None => self.emit_jmp(ctx, &end),
        }

        // body with case labels in place of the case statements; only
        // `break` is captured, `continue` still binds to the enclosing loop
        ctx.enter_scope();
        ctx.break_labels.push(end.clone());
        let mut case_iter = cases.iter();
        let mut result = Ok(());
        for stmt in &body.stmts {
            match stmt {
                Stmt::Case(_) => {
                    let (_, label) = case_iter.next().unwrap();
                    ctx.label(label);
                }
                Stmt::Default => {
                    ctx.label(default_label.as_ref().unwrap());
                }
                other => {
                    result = self.lower_stmt(ctx, other);
                    if result.is_err() {
                        break;
                    }
                }
            }
        }
        ctx.break_labels.pop();
        ctx.exit_scope();
        result?;

        ctx.label(&end);
        Ok(())
    }

    pub(crate) fn emit_jmp(&mut self, ctx: &mut ProcCtx, label: &str) {
        ctx.push(IrInstr::new(IrOp::Jmp, 0).with_op1(IrOper::var(label)));
    }

    // --- globals ---

    fn lower_global_decl(
        &mut self,
        decl: &Declaration,
        ir: &mut IrModule,
    ) -> Result<(), CompileError> {
        if decl.specs.has_storage_class("typedef") {
            return Ok(());
        }
        let is_extern = decl.specs.has_storage_class("extern");

        for init_decl in &decl.decls {
            let name = match init_decl.decl.ident() {
                Some(tok) => tok.text.clone(),
                None => continue,
            };

            if init_decl.decl.is_function() {
                // a prototype becomes an extern procedure unless a
                // definition exists in this module
                let defined = ir.decls.iter().any(|d| {
                    matches!(d, IrDecl::Proc(p) if p.ident == format!("@{}", name))
                });
                if !defined {
                    let sig = self.procs.get(&name).unwrap().clone();
                    let mut proc = IrProc::new(&format!("@{}", name));
                    proc.is_extern = true;
                    proc.is_variadic = sig.variadic;
                    for (index, ty) in sig.params.iter().enumerate() {
                        proc.args.push(IrProcArg {
                            name: format!("%{}", index),
                            ty: ty.to_ir(),
                        });
                    }
                    ir.decls.push(IrDecl::Proc(proc));
                }
                continue;
            }

            if is_extern {
                // storage lives in another module; references resolve
                // against the symbol
                continue;
            }

            let base = self.resolve_specs(&decl.specs)?;
            let ty = self.apply_declarator(base, &init_decl.decl)?;
            let data = self.global_data(&name, &ty, init_decl.init.as_ref())?;
            ir.decls.push(IrDecl::Var(IrVar {
                ident: format!("@{}", name),
                data,
            }));
        }
        Ok(())
    }

    /// Build the data block for one global from its type and initializer.
    fn global_data(
        &mut self,
        name: &str,
        ty: &CType,
        init: Option<&Init>,
    ) -> Result<Vec<DataEntry>, CompileError> {
        match ty {
            CType::Int { bits, .. } if *bits > 64 => Err(CompileError::SemanticError {
                ident: name.to_string(),
                reason: "global wider than 64 bits".to_string(),
            }),
            CType::Int { bits, .. } => {
                let value = match init {
                    Some(Init::Expr(expr)) => self.const_eval(expr)?,
                    Some(Init::List(_)) => {
                        return Err(CompileError::SemanticError {
                            ident: name.to_string(),
                            reason: "initializer list on a scalar global".to_string(),
                        });
                    }
                    None => 0,
                };
                Ok(vec![scalar_entry(*bits, value)])
            }
            CType::Ptr(_) => match init {
                None => Ok(vec![DataEntry::Word(0)]),
                Some(Init::Expr(expr)) => match &**expr {
                    Expr::Unary(UnOp::AddrOf, inner) => match &**inner {
                        Expr::Ident(tok) => Ok(vec![DataEntry::WordSym {
                            symbol: format!("@{}", tok.text),
                            addend: 0,
                        }]),
                        _ => Err(CompileError::SemanticError {
                            ident: name.to_string(),
                            reason: "unsupported pointer initializer".to_string(),
                        }),
                    },
                    Expr::Ident(tok) if self.globals.contains_key(&tok.text) => {
                        Ok(vec![DataEntry::WordSym {
                            symbol: format!("@{}", tok.text),
                            addend: 0,
                        }])
                    }
                    Expr::Str(tok) => {
                        let symbol = self.intern_string(&decode_string_literal(&tok.text));
                        Ok(vec![DataEntry::WordSym { symbol, addend: 0 }])
                    }
                    other => {
                        let value = self.const_eval(other)?;
                        Ok(vec![DataEntry::Word(value as u16)])
                    }
                },
                Some(Init::List(_)) => Err(CompileError::SemanticError {
                    ident: name.to_string(),
                    reason: "initializer list on a pointer global".to_string(),
                }),
            },
            CType::Array(elem, count) => {
                let elem_bits = elem.value_bits();
                let mut entries = Vec::new();
                match init {
                    Some(Init::List(list)) => {
                        for item in &list.inits {
                            let value = match item {
                                Init::Expr(expr) => self.const_eval(expr)?,
                                Init::List(_) => {
                                    return Err(CompileError::SemanticError {
                                        ident: name.to_string(),
                                        reason: "nested initializer lists are not supported"
                                            .to_string(),
                                    });
                                }
                            };
                            entries.push(scalar_entry(elem_bits, value));
                        }
                    }
                    Some(Init::Expr(expr)) => match &**expr {
                        Expr::Str(tok) if elem_bits == 8 => {
                            for byte in decode_string_literal(&tok.text) {
                                entries.push(DataEntry::Byte(byte));
                            }
                            entries.push(DataEntry::Byte(0));
                        }
                        _ => {
                            return Err(CompileError::SemanticError {
                                ident: name.to_string(),
                                reason: "unsupported array initializer".to_string(),
                            });
                        }
                    },
                    None => {}
                }
                let total = if *count > 0 { *count as usize } else { entries.len() };
                while entries.len() < total {
                    entries.push(scalar_entry(elem_bits, 0));
                }
                Ok(entries)
            }
            CType::Void => Err(CompileError::SemanticError {
                ident: name.to_string(),
                reason: "void object".to_string(),
            }),
        }
    }

    /// Intern a string literal as an anonymous global; returns its IR
    /// identifier.
    pub(crate) fn intern_string(&mut self, bytes: &[u8]) -> String {
        let ident = format!("@_strlit{}", self.str_count);
        self.str_count += 1;
        let mut data: Vec<DataEntry> = bytes.iter().map(|b| DataEntry::Byte(*b)).collect();
        data.push(DataEntry::Byte(0));
        self.str_vars.push(IrVar {
            ident: ident.clone(),
            data,
        });
        ident
    }
}

fn scalar_entry(bits: u32, value: i64) -> DataEntry {
    match bits {
        8 => DataEntry::Byte(truncate_value(value, 8) as u8),
        32 => DataEntry::Dword(truncate_value(value, 32) as u32),
        64 => DataEntry::Qword(value as u64),
        _ => DataEntry::Word(truncate_value(value, 16) as u16),
    }
}

// ------------- unit tests -------------
