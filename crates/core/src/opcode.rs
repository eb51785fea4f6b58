//! Opcode numbering for the stack interpreter
//!
//! Opcodes are small positive integers assigned densely starting at 1. The
//! bytecode stream is a flat sequence of little-endian 64-bit words: an
//! opcode word followed by however many operand words that opcode takes.
//! The interpreter reads from offset 0 and executes linearly, so this
//! numbering cannot change without a coordinated release on both sides.
//!
//! `CODE` is reserved by the numbering but never emitted: a code block is
//! written as `LABEL`, its id, and three raw header words (bound count,
//! free count, body length + 1) followed by the body and `RET`.

/// One interpreter instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Op {
    Load64 = 1,
    Return,
    Add1,
    Sub1,
    IntToChar,
    CharToInt,
    IsNull,
    IsZero,
    Not,
    IsInt,
    IsBool,
    Plus,
    Times,
    Minus,
    Lt,
    Gt,
    Leq,
    Geq,
    Eq,
    PopJumpIfFalse,
    JumpOverElse,
    PushLet,
    EndLet,
    Cons,
    Car,
    Cdr,
    Str,
    StrRef,
    StrSet,
    StrApp,
    Vec,
    VecRef,
    VecSet,
    VecApp,
    Beg,
    Label,
    Code,
    Closure,
    GetArg,
    Ret,
    Apply,
    GetFree,
}

impl Op {
    /// Recover an opcode from a bytecode word.
    pub fn from_word(word: u64) -> Option<Op> {
        use Op::*;
        Some(match word {
            1 => Load64,
            2 => Return,
            3 => Add1,
            4 => Sub1,
            5 => IntToChar,
            6 => CharToInt,
            7 => IsNull,
            8 => IsZero,
            9 => Not,
            10 => IsInt,
            11 => IsBool,
            12 => Plus,
            13 => Times,
            14 => Minus,
            15 => Lt,
            16 => Gt,
            17 => Leq,
            18 => Geq,
            19 => Eq,
            20 => PopJumpIfFalse,
            21 => JumpOverElse,
            22 => PushLet,
            23 => EndLet,
            24 => Cons,
            25 => Car,
            26 => Cdr,
            27 => Str,
            28 => StrRef,
            29 => StrSet,
            30 => StrApp,
            31 => Vec,
            32 => VecRef,
            33 => VecSet,
            34 => VecApp,
            35 => Beg,
            36 => Label,
            37 => Code,
            38 => Closure,
            39 => GetArg,
            40 => Ret,
            41 => Apply,
            42 => GetFree,
            _ => return None,
        })
    }

    /// Mnemonic used by the disassembler and diagnostics.
    pub fn mnemonic(self) -> &'static str {
        use Op::*;
        match self {
            Load64 => "LOAD64",
            Return => "RETURN",
            Add1 => "ADD1",
            Sub1 => "SUB1",
            IntToChar => "INT_TO_CHAR",
            CharToInt => "CHAR_TO_INT",
            IsNull => "IS_NULL",
            IsZero => "IS_ZERO",
            Not => "NOT",
            IsInt => "IS_INT",
            IsBool => "IS_BOOL",
            Plus => "PLUS",
            Times => "TIMES",
            Minus => "MINUS",
            Lt => "LT",
            Gt => "GT",
            Leq => "LEQ",
            Geq => "GEQ",
            Eq => "EQ",
            PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            JumpOverElse => "JUMP_OVER_ELSE",
            PushLet => "PUSH_LET",
            EndLet => "END_LET",
            Cons => "CONS",
            Car => "CAR",
            Cdr => "CDR",
            Str => "STR",
            StrRef => "STR_REF",
            StrSet => "STR_SET",
            StrApp => "STR_APP",
            Vec => "VEC",
            VecRef => "VEC_REF",
            VecSet => "VEC_SET",
            VecApp => "VEC_APP",
            Beg => "BEG",
            Label => "LABEL",
            Code => "CODE",
            Closure => "CLOSURE",
            GetArg => "GET_ARG",
            Ret => "RET",
            Apply => "APPLY",
            GetFree => "GET_FREE",
        }
    }

    /// Number of operand words following this opcode in the stream.
    ///
    /// `LABEL` counts its id plus the three code-block header words, which
    /// keeps the whole stream walkable one instruction at a time.
    pub fn operand_count(self) -> usize {
        use Op::*;
        match self {
            Load64 | PopJumpIfFalse | JumpOverElse | PushLet | EndLet | Str | Vec | Beg
            | Closure | GetArg | GetFree => 1,
            Label => 4,
            _ => 0,
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl From<Op> for u64 {
    fn from(op: Op) -> u64 {
        op as u64
    }
}

/// Render a bytecode word sequence as one instruction per line.
///
/// Words that should be opcodes but are not in the numbering are printed as
/// `??` so a truncated or corrupt stream is still inspectable.
pub fn disassemble(words: &[u64]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < words.len() {
        match Op::from_word(words[i]) {
            Some(op) => {
                let operands = op.operand_count().min(words.len() - i - 1);
                out.push_str(&format!("{:4}: {}", i, op.mnemonic()));
                for w in &words[i + 1..i + 1 + operands] {
                    out.push_str(&format!(" {}", w));
                }
                out.push('\n');
                i += 1 + operands;
            }
            None => {
                out.push_str(&format!("{:4}: ?? {}\n", i, words[i]));
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering_is_dense_from_one() {
        // The interpreter pins these values; spot-check the corners and a
        // few interior assignments.
        assert_eq!(u64::from(Op::Load64), 1);
        assert_eq!(u64::from(Op::Return), 2);
        assert_eq!(u64::from(Op::Plus), 12);
        assert_eq!(u64::from(Op::Times), 13);
        assert_eq!(u64::from(Op::Minus), 14);
        assert_eq!(u64::from(Op::Eq), 19);
        assert_eq!(u64::from(Op::PopJumpIfFalse), 20);
        assert_eq!(u64::from(Op::PushLet), 22);
        assert_eq!(u64::from(Op::Str), 27);
        assert_eq!(u64::from(Op::Vec), 31);
        assert_eq!(u64::from(Op::Label), 36);
        assert_eq!(u64::from(Op::Code), 37);
        assert_eq!(u64::from(Op::Closure), 38);
        assert_eq!(u64::from(Op::GetFree), 42);
    }

    #[test]
    fn test_from_word_round_trip() {
        for word in 1..=42u64 {
            let op = Op::from_word(word).unwrap();
            assert_eq!(u64::from(op), word);
        }
        assert_eq!(Op::from_word(0), None);
        assert_eq!(Op::from_word(43), None);
    }

    #[test]
    fn test_disassemble_simple_program() {
        // LOAD64 168, RETURN
        let words = [1, 168, 2];
        let listing = disassemble(&words);
        assert_eq!(listing, "   0: LOAD64 168\n   2: RETURN\n");
    }

    #[test]
    fn test_disassemble_label_header() {
        // LABEL 0 with 1 bound, 1 free, body length 6.
        let words = [36, 0, 1, 1, 6, 42, 0, 39, 0, 12, 40];
        let listing = disassemble(&words);
        assert!(listing.starts_with("   0: LABEL 0 1 1 6\n"));
        assert!(listing.contains("GET_FREE 0"));
        assert!(listing.contains("GET_ARG 0"));
        assert!(listing.ends_with("RET\n"));
    }

    #[test]
    fn test_disassemble_unknown_word() {
        let listing = disassemble(&[99]);
        assert_eq!(listing, "   0: ?? 99\n");
    }
}
