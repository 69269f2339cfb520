use std::fmt::{Display, Formatter};

/// Binary operators recognized by the expression translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    pub fn from_token(text: &str) -> Option<Self> {
        let op = match text {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Rem,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "<=" => Self::Le,
            ">=" => Self::Ge,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            _ => return None,
        };

        Some(op)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One three-address instruction.
///
/// `Display` renders the exact textual form the artifact file carries.
/// Instruction order is the only control-flow structure there is: jumps and
/// labels refer to each other by name alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// `func name:`
    Func(String),
    /// `L1:`
    Label(String),
    /// `goto L1`
    Goto(String),
    /// `if t1 goto L1`
    Branch { cond: String, target: String },
    /// `if not t1 goto L1`
    BranchNot { cond: String, target: String },
    /// `t1 = a + b`
    Binary {
        dest: String,
        left: String,
        op: BinOp,
        right: String,
    },
    /// `x = t1`, also the degraded form `t1 = <joined source text>`
    Copy { dest: String, value: String },
    /// `return` / `return x`
    Return(Option<String>),
    /// `t1 = call f(a, b)`
    Call {
        dest: String,
        name: String,
        args: Vec<String>,
    },
    /// `print(a, b)`
    Print { args: Vec<String> },
}

impl Display for Instr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Func(name) => write!(f, "func {name}:"),
            Self::Label(label) => write!(f, "{label}:"),
            Self::Goto(label) => write!(f, "goto {label}"),
            Self::Branch { cond, target } => write!(f, "if {cond} goto {target}"),
            Self::BranchNot { cond, target } => write!(f, "if not {cond} goto {target}"),
            Self::Binary {
                dest,
                left,
                op,
                right,
            } => write!(f, "{dest} = {left} {op} {right}"),
            Self::Copy { dest, value } => write!(f, "{dest} = {value}"),
            Self::Return(None) => write!(f, "return"),
            Self::Return(Some(value)) => write!(f, "return {value}"),
            Self::Call { dest, name, args } => {
                write!(f, "{dest} = call {name}({})", args.join(", "))
            }
            Self::Print { args } => write!(f, "print({})", args.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Instr::Func("main".into()), "func main:"; "function marker")]
    #[test_case(Instr::Label("L3".into()), "L3:"; "label")]
    #[test_case(Instr::Goto("L1".into()), "goto L1"; "goto")]
    #[test_case(Instr::Branch { cond: "t1".into(), target: "L2".into() }, "if t1 goto L2"; "branch")]
    #[test_case(Instr::BranchNot { cond: "t1".into(), target: "L2".into() }, "if not t1 goto L2"; "negated branch")]
    #[test_case(Instr::Binary { dest: "t1".into(), left: "1".into(), op: BinOp::Add, right: "2".into() }, "t1 = 1 + 2"; "binary")]
    #[test_case(Instr::Copy { dest: "x".into(), value: "t1".into() }, "x = t1"; "copy")]
    #[test_case(Instr::Return(None), "return"; "bare return")]
    #[test_case(Instr::Return(Some("x".into())), "return x"; "return value")]
    #[test_case(Instr::Call { dest: "t1".into(), name: "f".into(), args: vec!["a".into(), "b".into()] }, "t1 = call f(a, b)"; "call")]
    #[test_case(Instr::Print { args: vec!["\"hi\"".into(), "x".into()] }, "print(\"hi\", x)"; "print")]
    fn renders(instr: Instr, expected: &str) {
        assert_eq!(instr.to_string(), expected);
    }
}
