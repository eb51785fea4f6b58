//! Bytecode generation
//!
//! Walks the annotated IR and emits 64-bit opcode/operand words. The
//! generator simulates the interpreter's stack height (`stack_ind` always
//! equals the number of values pushed at that program point) and keeps a
//! stack of `let` environments mapping binding names to absolute stack
//! slots. A `PUSH_LET` operand is the relative distance from the current
//! top to the binding's slot, computed at the point of use.
//!
//! Forward branch distances are precomputed by [`bytecode_length`], which
//! mirrors the emission rules exactly; the tests pin the two against each
//! other across every syntactic shape, since a mismatch silently corrupts
//! branch targets.

use std::collections::HashMap;
use std::io::Write;

use scm_core::opcode::{Op, disassemble};
use scm_core::value::{box_bool, box_char, box_empty_list, box_fixnum};

use crate::ast::Expr;
use crate::error::CompileError;

/// Number of words the generator will emit for `expr` under identical
/// scope. Used to precompute forward jump distances before the target code
/// exists.
pub fn bytecode_length(expr: &Expr) -> usize {
    match expr {
        Expr::Int(_)
        | Expr::Bool(_)
        | Expr::Char(_)
        | Expr::EmptyList
        | Expr::Var(_)
        | Expr::Local(_)
        | Expr::Bound(_)
        | Expr::Free(_) => 2,
        Expr::Prim(_, args) => 1 + args.iter().map(bytecode_length).sum::<usize>(),
        Expr::If(test, consequent, alternative) => {
            4 + bytecode_length(test) + bytecode_length(consequent) + bytecode_length(alternative)
        }
        Expr::Cons(car, cdr) => 1 + bytecode_length(car) + bytecode_length(cdr),
        Expr::Str(chars) => 2 * chars.len() + 2,
        Expr::Vector(items) | Expr::Begin(items) => {
            2 + items.iter().map(bytecode_length).sum::<usize>()
        }
        Expr::Let(bindings, body) => {
            2 + bindings
                .iter()
                .map(|(_, rhs)| bytecode_length(rhs))
                .sum::<usize>()
                + bytecode_length(body)
        }
        // Lambdas are lifted before code generation; one reaching the
        // generator is rejected in `compile`.
        Expr::Lambda { .. } => 0,
        Expr::Closure { free, .. } => 2 + free.iter().map(bytecode_length).sum::<usize>(),
        Expr::Labels { labels, body } => {
            labels
                .iter()
                .map(|(_, code)| 6 + bytecode_length(&code.body))
                .sum::<usize>()
                + bytecode_length(body)
        }
        Expr::Apply { callee, args } => {
            1 + bytecode_length(callee) + args.iter().map(bytecode_length).sum::<usize>()
        }
    }
}

pub struct CodeGen {
    code: Vec<u64>,
    /// Simulated absolute stack depth at the current program point.
    stack_ind: usize,
    /// Stack of `let` environments: name -> absolute stack slot. Each new
    /// frame starts as a copy of its parent so shadowing resolves to the
    /// innermost binding.
    env: Vec<HashMap<String, usize>>,
    /// Label name -> dense id (the label-table index).
    label_ids: HashMap<String, usize>,
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen {
            code: Vec::new(),
            stack_ind: 0,
            env: Vec::new(),
            label_ids: HashMap::new(),
        }
    }

    /// Compile a whole program: the expression followed by `RETURN`.
    pub fn compile_program(&mut self, expr: &Expr) -> Result<(), CompileError> {
        self.compile(expr, &[], &[])?;
        self.emit(Op::Return);
        Ok(())
    }

    pub fn words(&self) -> &[u64] {
        &self.code
    }

    pub fn into_words(self) -> Vec<u64> {
        self.code
    }

    /// Serialize the opcode sequence as little-endian 64-bit words. No
    /// framing, no header, no trailer.
    pub fn write_to_stream<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for word in &self.code {
            out.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    /// Human-readable listing of the emitted instructions.
    pub fn dump(&self) -> String {
        disassemble(&self.code)
    }

    fn compile(
        &mut self,
        expr: &Expr,
        frees: &[String],
        bounds: &[String],
    ) -> Result<(), CompileError> {
        match expr {
            Expr::Int(n) => {
                self.emit(Op::Load64);
                self.emit_word(box_fixnum(*n)?);
                self.stack_ind += 1;
            }
            Expr::Bool(b) => {
                self.emit(Op::Load64);
                self.emit_word(box_bool(*b));
                self.stack_ind += 1;
            }
            Expr::Char(c) => {
                self.emit(Op::Load64);
                self.emit_word(box_char(*c));
                self.stack_ind += 1;
            }
            Expr::EmptyList => {
                self.emit(Op::Load64);
                self.emit_word(box_empty_list());
                self.stack_ind += 1;
            }
            Expr::Bound(name) => {
                let index = bounds
                    .iter()
                    .position(|b| b == name)
                    .ok_or_else(|| unbound(name))?;
                self.emit(Op::GetArg);
                self.emit_word(index as u64);
                self.stack_ind += 1;
            }
            Expr::Free(name) => {
                let index = frees
                    .iter()
                    .position(|f| f == name)
                    .ok_or_else(|| unbound(name))?;
                self.emit(Op::GetFree);
                self.emit_word(index as u64);
                self.stack_ind += 1;
            }
            Expr::Local(name) => {
                let slot = self
                    .env
                    .last()
                    .and_then(|frame| frame.get(name))
                    .copied()
                    .ok_or_else(|| unbound(name))?;
                self.emit(Op::PushLet);
                self.emit_word((self.stack_ind - 1 - slot) as u64);
                self.stack_ind += 1;
            }
            Expr::Var(name) => return Err(unbound(name)),
            Expr::Prim(prim, args) => {
                for arg in args {
                    self.compile(arg, frees, bounds)?;
                }
                self.emit(prim.opcode());
                self.stack_ind -= prim.arity() - 1;
            }
            Expr::If(test, consequent, alternative) => {
                self.compile(test, frees, bounds)?;
                self.emit(Op::PopJumpIfFalse);
                self.emit_word((bytecode_length(consequent) + 2) as u64);
                // Branching pops the condition.
                self.stack_ind -= 1;
                self.compile(consequent, frees, bounds)?;
                self.emit(Op::JumpOverElse);
                self.emit_word(bytecode_length(alternative) as u64);
                // Only one branch runs at runtime.
                self.stack_ind -= 1;
                self.compile(alternative, frees, bounds)?;
            }
            Expr::Cons(car, cdr) => {
                self.compile(cdr, frees, bounds)?;
                self.compile(car, frees, bounds)?;
                self.emit(Op::Cons);
                self.stack_ind -= 1;
            }
            Expr::Str(chars) => {
                for &c in chars {
                    self.emit(Op::Load64);
                    self.emit_word(box_char(c));
                    self.stack_ind += 1;
                }
                self.emit(Op::Str);
                self.emit_word(chars.len() as u64);
                self.stack_ind = self.stack_ind + 1 - chars.len();
            }
            Expr::Vector(items) => {
                for item in items {
                    self.compile(item, frees, bounds)?;
                }
                self.emit(Op::Vec);
                self.emit_word(items.len() as u64);
                self.stack_ind = self.stack_ind + 1 - items.len();
            }
            Expr::Begin(items) => {
                for item in items {
                    self.compile(item, frees, bounds)?;
                }
                self.emit(Op::Beg);
                self.emit_word(items.len() as u64);
                self.stack_ind = self.stack_ind + 1 - items.len();
            }
            Expr::Let(bindings, body) => {
                let parent = self.env.last().cloned().unwrap_or_default();
                self.env.push(parent);
                for (name, rhs) in bindings {
                    self.compile(rhs, frees, bounds)?;
                    if let Some(frame) = self.env.last_mut() {
                        frame.insert(name.clone(), self.stack_ind - 1);
                    }
                }
                self.compile(body, frees, bounds)?;
                self.env.pop();
                self.emit(Op::EndLet);
                self.emit_word(bindings.len() as u64);
                self.stack_ind -= bindings.len();
            }
            Expr::Lambda { .. } => {
                return Err(CompileError::Semantic(
                    "lambda not closure-converted before code generation".to_string(),
                ));
            }
            Expr::Closure { label, free } => {
                for capture in free {
                    self.compile(capture, frees, bounds)?;
                }
                let id = self
                    .label_ids
                    .get(label)
                    .copied()
                    .ok_or_else(|| CompileError::Semantic(format!("unknown closure label {}", label)))?;
                self.emit(Op::Closure);
                self.emit_word(id as u64);
                self.stack_ind = self.stack_ind + 1 - free.len();
            }
            Expr::Labels { labels, body } => {
                // Ids are table indices; populate the whole map first so a
                // closure in an early body can reference a later label.
                for (i, (name, _)) in labels.iter().enumerate() {
                    self.label_ids.insert(name.clone(), i);
                }
                let saved_stack = self.stack_ind;
                let saved_env = std::mem::take(&mut self.env);
                for (i, (_, code)) in labels.iter().enumerate() {
                    self.emit(Op::Label);
                    self.emit_word(i as u64);
                    self.emit_word(code.params.len() as u64);
                    self.emit_word(code.free.len() as u64);
                    self.emit_word((bytecode_length(&code.body) + 1) as u64);
                    // A code body executes in its own frame.
                    self.stack_ind = 0;
                    self.env.clear();
                    self.compile(&code.body, &code.free, &code.params)?;
                    self.emit(Op::Ret);
                }
                self.stack_ind = saved_stack;
                self.env = saved_env;
                self.compile(body, frees, bounds)?;
            }
            Expr::Apply { callee, args } => {
                for arg in args {
                    self.compile(arg, frees, bounds)?;
                }
                self.compile(callee, frees, bounds)?;
                self.emit(Op::Apply);
                self.stack_ind -= args.len();
            }
        }
        Ok(())
    }

    fn emit(&mut self, op: Op) {
        self.code.push(op.into());
    }

    fn emit_word(&mut self, word: u64) {
        self.code.push(word);
    }
}

impl Default for CodeGen {
    fn default() -> Self {
        CodeGen::new()
    }
}

fn unbound(name: &str) -> CompileError {
    CompileError::Semantic(format!("unbound variable {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::resolver::Resolver;

    const LOAD64: u64 = 1;
    const RETURN: u64 = 2;
    const ADD1: u64 = 3;
    const PLUS: u64 = 12;
    const POP_JUMP_IF_FALSE: u64 = 20;
    const JUMP_OVER_ELSE: u64 = 21;
    const PUSH_LET: u64 = 22;
    const END_LET: u64 = 23;
    const CONS: u64 = 24;
    const STR: u64 = 27;
    const VEC: u64 = 31;
    const BEG: u64 = 35;
    const LABEL: u64 = 36;
    const CLOSURE: u64 = 38;
    const GET_ARG: u64 = 39;
    const RET: u64 = 40;
    const APPLY: u64 = 41;
    const GET_FREE: u64 = 42;

    fn compile(source: &str) -> Result<Vec<u64>, CompileError> {
        let ast = Parser::new(source).parse()?;
        let ir = Resolver::new().resolve(ast);
        let mut codegen = CodeGen::new();
        codegen.compile_program(&ir)?;
        Ok(codegen.into_words())
    }

    fn words(source: &str) -> Vec<u64> {
        compile(source).unwrap()
    }

    #[test]
    fn test_integer_literal() {
        assert_eq!(words("42"), vec![LOAD64, 0xA8, RETURN]);
    }

    #[test]
    fn test_unary_builtin() {
        assert_eq!(words("(add1 0)"), vec![LOAD64, 0, ADD1, RETURN]);
    }

    #[test]
    fn test_binary_builtin() {
        assert_eq!(words("(+ 1 2)"), vec![LOAD64, 4, LOAD64, 8, PLUS, RETURN]);
    }

    #[test]
    fn test_if_branch_distances() {
        assert_eq!(
            words("(if #t 4 5)"),
            vec![
                LOAD64,
                0x9F,
                POP_JUMP_IF_FALSE,
                4,
                LOAD64,
                16,
                JUMP_OVER_ELSE,
                2,
                LOAD64,
                20,
                RETURN
            ]
        );
    }

    #[test]
    fn test_let_slot_addressing() {
        assert_eq!(
            words("(let ((a 4) (b 5)) (+ a b))"),
            vec![
                LOAD64, 16, LOAD64, 20, PUSH_LET, 1, PUSH_LET, 1, PLUS, END_LET, 2, RETURN
            ]
        );
    }

    #[test]
    fn test_closure_over_let_binding() {
        assert_eq!(
            words("(let ((x 3)) (lambda (y) (+ x y)))"),
            vec![
                LABEL, 0, 1, 1, 6, GET_FREE, 0, GET_ARG, 0, PLUS, RET, LOAD64, 12, PUSH_LET, 0,
                CLOSURE, 0, END_LET, 1, RETURN
            ]
        );
    }

    #[test]
    fn test_shadowing_resolves_to_innermost_slot() {
        assert_eq!(
            words("(let ((a 4)) (let ((a 5)) a))"),
            vec![
                LOAD64, 16, LOAD64, 20, PUSH_LET, 0, END_LET, 1, END_LET, 1, RETURN
            ]
        );
    }

    #[test]
    fn test_outer_binding_across_inner_scope() {
        // Reading the outer `a` from inside the inner let skips over the
        // inner binding's slot.
        assert_eq!(
            words("(let ((a 4)) (let ((b 5)) a))"),
            vec![
                LOAD64, 16, LOAD64, 20, PUSH_LET, 1, END_LET, 1, END_LET, 1, RETURN
            ]
        );
    }

    #[test]
    fn test_cons_compiles_cdr_first() {
        assert_eq!(
            words("(cons 1 2)"),
            vec![LOAD64, 8, LOAD64, 4, CONS, RETURN]
        );
    }

    #[test]
    fn test_string_builds_from_boxed_chars() {
        assert_eq!(
            words("(string \"hi\")"),
            vec![LOAD64, 0x680F, LOAD64, 0x690F, STR, 2, RETURN]
        );
    }

    #[test]
    fn test_empty_vector() {
        assert_eq!(words("(vector)"), vec![VEC, 0, RETURN]);
    }

    #[test]
    fn test_begin_counts_expressions() {
        assert_eq!(
            words("(begin (+ 4 3))"),
            vec![LOAD64, 16, LOAD64, 12, PLUS, BEG, 1, RETURN]
        );
    }

    #[test]
    fn test_empty_list_literal() {
        assert_eq!(words("()"), vec![LOAD64, 0x2F, RETURN]);
    }

    #[test]
    fn test_application_of_lambda() {
        assert_eq!(
            words("((lambda () 3))"),
            vec![LABEL, 0, 0, 0, 3, LOAD64, 12, RET, CLOSURE, 0, APPLY, RETURN]
        );
    }

    #[test]
    fn test_application_argument_order() {
        // Arguments left to right, then the callee, then APPLY.
        assert_eq!(
            words("((lambda (x) x) 9)"),
            vec![
                LABEL, 0, 1, 0, 3, GET_ARG, 0, RET, LOAD64, 36, CLOSURE, 0, APPLY, RETURN
            ]
        );
    }

    #[test]
    fn test_nested_lambda_forward_label_reference() {
        // The outer code body references f1, which is emitted after f0.
        let code = words("(lambda (x) (lambda () x))");
        assert_eq!(
            code,
            vec![
                LABEL, 0, 1, 0, 5, GET_ARG, 0, CLOSURE, 1, RET, LABEL, 1, 0, 1, 3, GET_FREE, 0,
                RET, CLOSURE, 0, RETURN
            ]
        );
    }

    #[test]
    fn test_branch_operand_words_match_distances() {
        let code = words("(if (zero? 1) (+ 1 2) 9)");
        // Find the branch instructions and verify invariant (v): the
        // operand counts the words between the following instruction and
        // the branch target.
        let pjif = code.iter().position(|&w| w == POP_JUMP_IF_FALSE).unwrap();
        let joe = code.iter().position(|&w| w == JUMP_OVER_ELSE).unwrap();
        // Words between the POP_JUMP_IF_FALSE operand and the start of the
        // alternative: the consequent plus the jump pair.
        let alt_start = joe + 2;
        assert_eq!(code[pjif + 1] as usize, alt_start - (pjif + 2));
        // Words between the JUMP_OVER_ELSE operand and the end of the
        // alternative (RETURN is one past it).
        let alt_end = code.len() - 1;
        assert_eq!(code[joe + 1] as usize, alt_end - (joe + 2));
    }

    #[test]
    fn test_bytecode_length_matches_emission() {
        // The branch math relies on bytecode_length agreeing with the
        // generator on every syntactic shape.
        let sources = [
            "42",
            "#t",
            r"#\a",
            "()",
            "(add1 4)",
            "(+ 1 (* 2 3))",
            "(string-set! (string \"ab\") 0 #\\c)",
            "(if #t 4 5)",
            "(if (zero? 1) (if #f 1 2) (begin 3 4))",
            "(cons 1 (cons 2 ()))",
            "(string \"hello\")",
            "(vector 1 2 3)",
            "(vector)",
            "(begin 1 2 3)",
            "(let ((a 4)) a)",
            "(let ((a 4) (b 5)) (+ a b))",
            "(let ((a (let ((b 2)) b))) a)",
            "(lambda (x) x)",
            "(lambda (x) (lambda () x))",
            "(let ((x 3)) (lambda (y) (+ x y)))",
            "((lambda (x) x) 9)",
            "(let ((f 1)) (f 2 3))",
        ];
        for source in sources {
            let ast = Parser::new(source).parse().unwrap();
            let ir = Resolver::new().resolve(ast);
            let mut codegen = CodeGen::new();
            // Programs with unbound variables still emit before failing,
            // so only compare on success.
            if codegen.compile_program(&ir).is_ok() {
                assert_eq!(
                    codegen.words().len(),
                    bytecode_length(&ir) + 1,
                    "length mismatch for {}",
                    source
                );
            }
        }
    }

    #[test]
    fn test_unbound_variable() {
        let err = compile("(let ((a 1)) (add1 zz))").unwrap_err();
        assert!(matches!(err, CompileError::Semantic(_)));
        assert!(err.to_string().contains("unbound variable zz"));
    }

    #[test]
    fn test_unknown_closure_label() {
        let mut codegen = CodeGen::new();
        let orphan = Expr::Closure {
            label: "f9".to_string(),
            free: vec![],
        };
        let err = codegen.compile_program(&orphan).unwrap_err();
        assert!(err.to_string().contains("unknown closure label f9"));
    }

    #[test]
    fn test_fixnum_overflow_surfaces() {
        let err = compile("4611686018427387904").unwrap_err();
        assert!(matches!(err, CompileError::Overflow(_)));
    }

    #[test]
    fn test_write_to_stream_little_endian() {
        let ast = Parser::new("42").parse().unwrap();
        let ir = Resolver::new().resolve(ast);
        let mut codegen = CodeGen::new();
        codegen.compile_program(&ir).unwrap();
        let mut bytes = Vec::new();
        codegen.write_to_stream(&mut bytes).unwrap();
        let mut expected = vec![0u8; 24];
        expected[0] = 0x01;
        expected[8] = 0xA8;
        expected[16] = 0x02;
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_dump_lists_mnemonics() {
        let ast = Parser::new("(add1 0)").parse().unwrap();
        let ir = Resolver::new().resolve(ast);
        let mut codegen = CodeGen::new();
        codegen.compile_program(&ir).unwrap();
        let listing = codegen.dump();
        assert!(listing.contains("LOAD64 0"));
        assert!(listing.contains("ADD1"));
        assert!(listing.contains("RETURN"));
    }
}
