//! Closure conversion and variable annotation
//!
//! A single pass over the parsed tree, in three layered steps:
//!
//! 1. Every `lambda` is lifted, in source pre-order, into a labeled code
//!    block (`f0`, `f1`, ...). Its free variables are collected from the
//!    body in first-occurrence order (names bound by an inner lambda's own
//!    formals are not free here), and the occurrence is replaced by a
//!    `Closure` node carrying references to the captured variables.
//! 2. Inside each lifted body, identifier occurrences matching the block's
//!    formals become `Bound`, and those matching its free list become
//!    `Free`.
//! 3. The top-level body and every lifted body are walked independently
//!    with a stack of `let` scopes; remaining identifiers that name a
//!    binding in scope become `Local`. A binding's right-hand side is
//!    annotated before its own name enters scope, and a group's names all
//!    enter scope together before the body.
//!
//! Anything still `Var` after all three steps is unbound and is reported by
//! the code generator.

use std::collections::HashSet;

use crate::ast::{CodeBlock, Expr};

pub struct Resolver {
    labels: Vec<(String, CodeBlock)>,
    next_label: usize,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            labels: Vec::new(),
            next_label: 0,
        }
    }

    /// Convert a parsed program into annotated IR. Returns the expression
    /// unwrapped when no lambdas occur, or a `Labels` wrapper whose table is
    /// ordered by label allocation.
    pub fn resolve(mut self, expr: Expr) -> Expr {
        let body = self.lift(expr);
        let body = annotate_locals(body, &mut Vec::new());
        if self.labels.is_empty() {
            body
        } else {
            let labels = self
                .labels
                .into_iter()
                .map(|(name, code)| {
                    let CodeBlock { params, free, body } = code;
                    let body = annotate_locals(body, &mut Vec::new());
                    (name, CodeBlock { params, free, body })
                })
                .collect();
            Expr::Labels {
                labels,
                body: Box::new(body),
            }
        }
    }

    /// Replace every lambda with a closure node, recording its code block in
    /// the label table. Labels are numbered in source pre-order, so an outer
    /// lambda always precedes the lambdas in its body.
    fn lift(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::Lambda { params, body } => {
                let label = format!("f{}", self.next_label);
                self.next_label += 1;
                // Reserve the table slot before recursing so nested lambdas
                // land after this one.
                let slot = self.labels.len();
                self.labels.push((
                    label.clone(),
                    CodeBlock {
                        params: Vec::new(),
                        free: Vec::new(),
                        body: Expr::EmptyList,
                    },
                ));

                let free = free_vars(&body, &params);
                let body = self.lift(*body);
                let body = tag_refs(body, &params, &free);
                self.labels[slot] = (
                    label.clone(),
                    CodeBlock {
                        params,
                        free: free.clone(),
                        body,
                    },
                );

                Expr::Closure {
                    label,
                    free: free.into_iter().map(Expr::Var).collect(),
                }
            }
            Expr::Prim(prim, args) => {
                Expr::Prim(prim, args.into_iter().map(|a| self.lift(a)).collect())
            }
            Expr::If(t, c, a) => Expr::If(
                Box::new(self.lift(*t)),
                Box::new(self.lift(*c)),
                Box::new(self.lift(*a)),
            ),
            Expr::Cons(car, cdr) => {
                Expr::Cons(Box::new(self.lift(*car)), Box::new(self.lift(*cdr)))
            }
            Expr::Vector(items) => {
                Expr::Vector(items.into_iter().map(|e| self.lift(e)).collect())
            }
            Expr::Begin(items) => Expr::Begin(items.into_iter().map(|e| self.lift(e)).collect()),
            Expr::Let(bindings, body) => Expr::Let(
                bindings
                    .into_iter()
                    .map(|(name, rhs)| (name, self.lift(rhs)))
                    .collect(),
                Box::new(self.lift(*body)),
            ),
            Expr::Apply { callee, args } => Expr::Apply {
                callee: Box::new(self.lift(*callee)),
                args: args.into_iter().map(|a| self.lift(a)).collect(),
            },
            leaf => leaf,
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new()
    }
}

/// Collect free variable names of a lambda body: every identifier occurrence
/// not bound by the given formals (or by a nested lambda's own formals),
/// first occurrence first, deduplicated.
fn free_vars(body: &Expr, params: &[String]) -> Vec<String> {
    let mut bound: HashSet<String> = params.iter().cloned().collect();
    let mut free = Vec::new();
    collect_free(body, &mut bound, &mut free);
    free
}

fn collect_free(expr: &Expr, bound: &mut HashSet<String>, free: &mut Vec<String>) {
    match expr {
        Expr::Var(name) => {
            if !bound.contains(name) && !free.contains(name) {
                free.push(name.clone());
            }
        }
        Expr::Prim(_, args) | Expr::Vector(args) | Expr::Begin(args) => {
            for a in args {
                collect_free(a, bound, free);
            }
        }
        Expr::If(t, c, a) => {
            collect_free(t, bound, free);
            collect_free(c, bound, free);
            collect_free(a, bound, free);
        }
        Expr::Cons(car, cdr) => {
            collect_free(car, bound, free);
            collect_free(cdr, bound, free);
        }
        Expr::Let(bindings, body) => {
            for (_, rhs) in bindings {
                collect_free(rhs, bound, free);
            }
            // Let-locals resolve on the local frame, not through the
            // closure; they shadow within the body like inner formals.
            let added: Vec<&String> = bindings
                .iter()
                .map(|(name, _)| name)
                .filter(|name| bound.insert((*name).clone()))
                .collect();
            collect_free(body, bound, free);
            for name in added {
                bound.remove(name);
            }
        }
        Expr::Lambda { params, body } => {
            // An inner lambda's formals shadow within its own body.
            let added: Vec<&String> = params.iter().filter(|p| bound.insert((*p).clone())).collect();
            collect_free(body, bound, free);
            for p in added {
                bound.remove(p);
            }
        }
        Expr::Apply { callee, args } => {
            collect_free(callee, bound, free);
            for a in args {
                collect_free(a, bound, free);
            }
        }
        _ => {}
    }
}

/// Tag identifier occurrences inside a lifted body: formals become `Bound`,
/// captured names become `Free`. Applies to the captured-variable reference
/// lists of nested closures too, which is how an inner closure's captures
/// chain through the enclosing frame.
fn tag_refs(expr: Expr, bounds: &[String], frees: &[String]) -> Expr {
    match expr {
        Expr::Var(name) => {
            if bounds.contains(&name) {
                Expr::Bound(name)
            } else if frees.contains(&name) {
                Expr::Free(name)
            } else {
                Expr::Var(name)
            }
        }
        Expr::Prim(prim, args) => Expr::Prim(
            prim,
            args.into_iter().map(|a| tag_refs(a, bounds, frees)).collect(),
        ),
        Expr::If(t, c, a) => Expr::If(
            Box::new(tag_refs(*t, bounds, frees)),
            Box::new(tag_refs(*c, bounds, frees)),
            Box::new(tag_refs(*a, bounds, frees)),
        ),
        Expr::Cons(car, cdr) => Expr::Cons(
            Box::new(tag_refs(*car, bounds, frees)),
            Box::new(tag_refs(*cdr, bounds, frees)),
        ),
        Expr::Vector(items) => Expr::Vector(
            items.into_iter().map(|e| tag_refs(e, bounds, frees)).collect(),
        ),
        Expr::Begin(items) => Expr::Begin(
            items.into_iter().map(|e| tag_refs(e, bounds, frees)).collect(),
        ),
        Expr::Let(bindings, body) => Expr::Let(
            bindings
                .into_iter()
                .map(|(name, rhs)| (name, tag_refs(rhs, bounds, frees)))
                .collect(),
            Box::new(tag_refs(*body, bounds, frees)),
        ),
        Expr::Closure { label, free } => Expr::Closure {
            label,
            free: free.into_iter().map(|e| tag_refs(e, bounds, frees)).collect(),
        },
        Expr::Apply { callee, args } => Expr::Apply {
            callee: Box::new(tag_refs(*callee, bounds, frees)),
            args: args.into_iter().map(|a| tag_refs(a, bounds, frees)).collect(),
        },
        leaf => leaf,
    }
}

/// Rewrite identifiers bound by enclosing `let` forms to `Local`. The scope
/// stack holds one name-set per open `let`; a new scope starts as a copy of
/// its parent so shadowing resolves to the innermost binding.
fn annotate_locals(expr: Expr, scopes: &mut Vec<HashSet<String>>) -> Expr {
    match expr {
        Expr::Var(name) => {
            if scopes.last().is_some_and(|scope| scope.contains(&name)) {
                Expr::Local(name)
            } else {
                Expr::Var(name)
            }
        }
        Expr::Let(bindings, body) => {
            let parent = scopes.last().cloned().unwrap_or_default();
            scopes.push(parent);
            // Right-hand sides see only the enclosing scopes.
            let bindings: Vec<(String, Expr)> = bindings
                .into_iter()
                .map(|(name, rhs)| {
                    let rhs = annotate_locals(rhs, scopes);
                    (name, rhs)
                })
                .collect();
            if let Some(scope) = scopes.last_mut() {
                for (name, _) in &bindings {
                    scope.insert(name.clone());
                }
            }
            let body = annotate_locals(*body, scopes);
            scopes.pop();
            Expr::Let(bindings, Box::new(body))
        }
        Expr::Prim(prim, args) => Expr::Prim(
            prim,
            args.into_iter().map(|a| annotate_locals(a, scopes)).collect(),
        ),
        Expr::If(t, c, a) => Expr::If(
            Box::new(annotate_locals(*t, scopes)),
            Box::new(annotate_locals(*c, scopes)),
            Box::new(annotate_locals(*a, scopes)),
        ),
        Expr::Cons(car, cdr) => Expr::Cons(
            Box::new(annotate_locals(*car, scopes)),
            Box::new(annotate_locals(*cdr, scopes)),
        ),
        Expr::Vector(items) => Expr::Vector(
            items.into_iter().map(|e| annotate_locals(e, scopes)).collect(),
        ),
        Expr::Begin(items) => Expr::Begin(
            items.into_iter().map(|e| annotate_locals(e, scopes)).collect(),
        ),
        Expr::Closure { label, free } => Expr::Closure {
            label,
            free: free.into_iter().map(|e| annotate_locals(e, scopes)).collect(),
        },
        Expr::Apply { callee, args } => Expr::Apply {
            callee: Box::new(annotate_locals(*callee, scopes)),
            args: args.into_iter().map(|a| annotate_locals(a, scopes)).collect(),
        },
        leaf => leaf,
    }
}
