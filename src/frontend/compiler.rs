use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use linear_map::LinearMap;
use tracing::{debug, trace};

use crate::frontend::ir::{BinOp, Instr};
use crate::frontend::syntax::{self, Token, TokenKind};
use crate::frontend::Error;

type Result<T> = std::result::Result<T, Error>;

/// Role of a name in the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Function,
    Variable,
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Function => "function",
            Self::Variable => "variable",
        })
    }
}

/// One open construct. A single tagged stack replaces separate block and
/// loop stacks; the tag decides what IR a closing brace emits.
///
/// `body_closed` marks an `if` whose body brace has been seen but whose
/// fate (an `else` on the next line, or nothing) is still unknown.
#[derive(Debug)]
enum Frame {
    Function,
    While {
        start: String,
        end: String,
    },
    For {
        start: String,
        end: String,
        increment: Vec<Token>,
    },
    If {
        else_label: String,
        end_label: String,
        body_closed: bool,
    },
    Else {
        end_label: String,
    },
}

/// A single translation session: feeds on source lines in order,
/// accumulates symbols and three-address code.
///
/// Parsing mutates session state and is deliberately not idempotent;
/// re-parsing a line duplicates its effect. A failed line leaves the
/// session unusable for the rest of the buffer.
pub struct Compiler {
    in_function: bool,
    current_function: Option<String>,
    main_found: bool,
    symbols: LinearMap<String, Symbol>,
    frames: Vec<Frame>,
    pending_else: Option<(String, String)>,
    temp_count: usize,
    label_count: usize,
    code: Vec<Instr>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            in_function: false,
            current_function: None,
            main_found: false,
            symbols: LinearMap::new(),
            frames: Vec::new(),
            pending_else: None,
            temp_count: 0,
            label_count: 0,
            code: Vec::new(),
        }
    }

    fn new_temp(&mut self) -> String {
        self.temp_count += 1;
        format!("t{}", self.temp_count)
    }

    fn new_label(&mut self) -> String {
        self.label_count += 1;
        format!("L{}", self.label_count)
    }

    /// Classifies one tokenized line by shape and either extends the IR or
    /// fails. Shapes are tried in a fixed priority order; the first match
    /// wins.
    pub fn parse_line(&mut self, line: &str, line_number: usize) -> Result<()> {
        let tokens = syntax::tokenize(line).map_err(|err| err.at_line(line_number))?;

        if tokens.is_empty() {
            return Ok(());
        }

        if tokens[0].kind == TokenKind::Preprocessor {
            trace!(line_number, "skipping preprocessor line");
            return Ok(());
        }

        debug!(line_number, tokens = tokens.len(), "dispatching statement");

        // An if whose body brace has been seen is kept alive for exactly one
        // line so a following `else` can claim it. Any other line seals it.
        if !is_else_header(&tokens) {
            self.resolve_dangling_if();
        }

        if is_function_header(&tokens) {
            return self.function_header(&tokens);
        }

        if is_control_header(&tokens) {
            return self.control_header(&tokens, line_number);
        }

        if tokens.len() == 1 && tokens[0].is("}") {
            return self.close_block(line_number);
        }

        if !self.in_function || self.frames.is_empty() {
            return Err(Error::syntax(line_number, "not inside function block"));
        }

        self.statement(&tokens, line, line_number)
    }

    /// Fails unless a `main` function header was seen during the session.
    pub fn validate_entry_point(&self) -> Result<()> {
        if self.main_found {
            Ok(())
        } else {
            Err(Error::MissingMain)
        }
    }

    /// Insertion-ordered snapshot of every declared name and its role.
    pub fn symbol_table(&self) -> &LinearMap<String, Symbol> {
        &self.symbols
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.code
    }

    /// The accumulated IR rendered to its textual form, in emission order.
    pub fn intermediate_code(&self) -> Vec<String> {
        self.code.iter().map(ToString::to_string).collect()
    }

    /// Writes the IR artifact, one instruction per line, no extra framing.
    pub fn write_intermediate_code(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = String::new();

        for instr in &self.code {
            out.push_str(&instr.to_string());
            out.push('\n');
        }

        fs::write(path, out)?;

        Ok(())
    }

    fn function_header(&mut self, tokens: &[Token]) -> Result<()> {
        let name = tokens[1].text.clone();

        debug!(name = %name, "entering function");

        self.in_function = true;
        self.frames.push(Frame::Function);

        if name == "main" {
            self.main_found = true;
        }

        self.symbols.insert(name.clone(), Symbol::Function);
        self.code.push(Instr::Func(name.clone()));
        self.current_function = Some(name);

        Ok(())
    }

    fn control_header(&mut self, tokens: &[Token], line_number: usize) -> Result<()> {
        match tokens[0].text.as_str() {
            "while" => {
                let start = self.new_label();
                let body = self.new_label();
                let end = self.new_label();

                self.code.push(Instr::Label(start.clone()));
                self.condition(condition_tokens(tokens), &body, &end);
                self.frames.push(Frame::While { start, end });

                Ok(())
            }
            "for" => {
                let start = self.new_label();
                let body = self.new_label();
                let end = self.new_label();
                let (init, cond, increment) = for_clauses(tokens);

                self.for_init(&init);
                self.code.push(Instr::Label(start.clone()));
                self.condition(&cond, &body, &end);
                self.frames.push(Frame::For {
                    start,
                    end,
                    increment,
                });

                Ok(())
            }
            "if" => {
                let (cond, instrs) = self.translate_expr(condition_tokens(tokens));
                self.code.extend(instrs);

                let else_label = self.new_label();
                let end_label = self.new_label();

                self.code.push(Instr::BranchNot {
                    cond,
                    target: else_label.clone(),
                });
                self.pending_else = Some((else_label.clone(), end_label.clone()));
                self.frames.push(Frame::If {
                    else_label,
                    end_label,
                    body_closed: false,
                });

                Ok(())
            }
            "else" => {
                let labels = match self.pending_else.take() {
                    Some(labels) if matches!(self.frames.last(), Some(Frame::If { .. })) => labels,
                    other => {
                        self.pending_else = other;
                        return Err(Error::syntax(
                            line_number,
                            "unexpected 'else' without matching 'if'",
                        ));
                    }
                };

                let (else_label, end_label) = labels;

                self.frames.pop();
                self.code.push(Instr::Goto(end_label.clone()));
                self.code.push(Instr::Label(else_label));
                self.frames.push(Frame::Else { end_label });

                Ok(())
            }
            _ => Err(Error::syntax(line_number, "unrecognized control keyword")),
        }
    }

    /// Emits the standard conditional prologue: the translated condition,
    /// a jump into the body when it holds and a jump past it otherwise.
    fn condition(&mut self, tokens: &[Token], body: &str, end: &str) {
        let (cond, instrs) = self.translate_expr(tokens);

        self.code.extend(instrs);
        self.code.push(Instr::Branch {
            cond,
            target: body.to_string(),
        });
        self.code.push(Instr::Goto(end.to_string()));
        self.code.push(Instr::Label(body.to_string()));
    }

    fn close_block(&mut self, line_number: usize) -> Result<()> {
        match self.frames.pop() {
            None => Err(Error::syntax(line_number, "unmatched closing brace")),
            Some(Frame::Function) => {
                trace!(function = ?self.current_function, "leaving function");
                self.in_function = false;
                self.current_function = None;

                Ok(())
            }
            Some(Frame::While { start, end }) => {
                self.code.push(Instr::Goto(start));
                self.code.push(Instr::Label(end));

                Ok(())
            }
            Some(Frame::For {
                start,
                end,
                increment,
            }) => {
                if !increment.is_empty() {
                    let (_, instrs) = self.translate_expr(&increment);
                    self.code.extend(instrs);
                }

                self.code.push(Instr::Goto(start));
                self.code.push(Instr::Label(end));

                Ok(())
            }
            Some(Frame::If {
                else_label,
                end_label,
                ..
            }) => {
                // The body just ended; an `else` may still follow on the
                // next line, so the frame stays.
                self.pending_else = Some((else_label.clone(), end_label.clone()));
                self.frames.push(Frame::If {
                    else_label,
                    end_label,
                    body_closed: true,
                });

                Ok(())
            }
            Some(Frame::Else { end_label }) => {
                self.code.push(Instr::Label(end_label));

                Ok(())
            }
        }
    }

    /// Seals an `if` whose body closed on a previous line and that no
    /// `else` claimed: only the end label is emitted, the else label is
    /// left dead.
    fn resolve_dangling_if(&mut self) {
        match self.frames.last() {
            Some(Frame::If {
                body_closed: true, ..
            }) => {}
            _ => return,
        }

        if let Some(Frame::If { end_label, .. }) = self.frames.pop() {
            trace!(label = %end_label, "closing if without else");
            self.code.push(Instr::Label(end_label));
        }

        self.pending_else = None;
    }

    fn statement(&mut self, tokens: &[Token], line: &str, line_number: usize) -> Result<()> {
        let last = &tokens[tokens.len() - 1];

        // declaration with initializer
        if tokens.len() >= 5
            && is_type_keyword(&tokens[0])
            && tokens[1].kind == TokenKind::Ident
            && tokens[2].is("=")
            && last.is(";")
        {
            let name = tokens[1].text.clone();

            self.symbols.insert(name.clone(), Symbol::Variable);
            self.assign(name, &tokens[3..tokens.len() - 1]);

            return Ok(());
        }

        // declaration without initializer
        if tokens.len() >= 3
            && is_type_keyword(&tokens[0])
            && tokens[1].kind == TokenKind::Ident
            && !has_text(tokens, "=")
            && last.is(";")
        {
            self.symbols.insert(tokens[1].text.clone(), Symbol::Variable);

            return Ok(());
        }

        // assignment
        if tokens.len() >= 4
            && tokens[0].kind == TokenKind::Ident
            && tokens[1].is("=")
            && last.is(";")
        {
            let name = tokens[0].text.clone();
            self.assign(name, &tokens[2..tokens.len() - 1]);

            return Ok(());
        }

        // return
        if tokens[0].is("return") && last.is(";") {
            if tokens.len() > 2 {
                let (result, instrs) = self.translate_expr(&tokens[1..tokens.len() - 1]);
                self.code.extend(instrs);
                self.code.push(Instr::Return(Some(result)));
            } else {
                self.code.push(Instr::Return(None));
            }

            return Ok(());
        }

        // call statement
        if tokens.len() >= 4
            && tokens[0].kind == TokenKind::Ident
            && tokens[1].is("(")
            && has_text(tokens, ")")
            && last.is(";")
        {
            let dest = self.new_temp();
            let name = tokens[0].text.clone();
            let args = argument_list(&tokens[2..tokens.len() - 2]);

            self.code.push(Instr::Call { dest, name, args });

            return Ok(());
        }

        // print statement
        if tokens.len() >= 4
            && tokens[0].is("print")
            && tokens[1].is("(")
            && has_text(tokens, ")")
            && last.is(";")
        {
            let args = argument_list(&tokens[2..tokens.len() - 2]);

            self.code.push(Instr::Print { args });

            return Ok(());
        }

        Err(Error::syntax(line_number, line.trim()))
    }

    /// Translates the right-hand side and emits `name = <result>`.
    fn assign(&mut self, name: String, rhs: &[Token]) {
        let (result, instrs) = self.translate_expr(rhs);

        self.code.extend(instrs);
        self.code.push(Instr::Copy {
            dest: name,
            value: result,
        });
    }

    fn for_init(&mut self, init: &[Token]) {
        if init.is_empty() {
            return;
        }

        if init.len() > 3
            && is_type_keyword(&init[0])
            && init[1].kind == TokenKind::Ident
            && init[2].is("=")
        {
            let name = init[1].text.clone();

            self.symbols.insert(name.clone(), Symbol::Variable);
            self.assign(name, &init[3..]);
        } else if let Some(eq) = init.iter().position(|t| t.is("=")) {
            self.assign(init[0].text.clone(), &init[eq + 1..]);
        }
    }

    /// Precedence-free, left-to-right translation of a flat token sequence
    /// into `(result operand, instructions)`.
    ///
    /// Identifiers and numbers push; a recognized operator pops its left
    /// side and consumes the next token as the right side; parentheses and
    /// anything unrecognized are skipped. Total by design: whenever the
    /// scan does not reduce to a single operand, the joined source text is
    /// assigned to a fresh temp instead of failing.
    fn translate_expr(&mut self, tokens: &[Token]) -> (String, Vec<Instr>) {
        let mut code = Vec::new();
        let mut operands: Vec<String> = Vec::new();
        let mut degraded = false;

        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];

            if matches!(token.kind, TokenKind::Ident | TokenKind::Number) {
                operands.push(token.text.clone());
                i += 1;
                continue;
            }

            if let Some(op) = BinOp::from_token(&token.text) {
                let (left, right) = match (operands.pop(), tokens.get(i + 1)) {
                    (Some(left), Some(right)) => (left, right.text.clone()),
                    _ => {
                        degraded = true;
                        break;
                    }
                };

                let dest = self.new_temp();

                code.push(Instr::Binary {
                    dest: dest.clone(),
                    left,
                    op,
                    right,
                });
                operands.push(dest);
                i += 2;
                continue;
            }

            i += 1;
        }

        if !degraded {
            if let [result] = operands.as_slice() {
                return (result.clone(), code);
            }
        }

        let dest = self.new_temp();
        let joined = tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        trace!(temp = %dest, "expression did not reduce, emitting joined text");
        code.push(Instr::Copy {
            dest: dest.clone(),
            value: joined,
        });

        (dest, code)
    }
}

fn has_text(tokens: &[Token], text: &str) -> bool {
    tokens.iter().any(|t| t.is(text))
}

fn is_type_keyword(token: &Token) -> bool {
    token.kind == TokenKind::Keyword
        && matches!(token.text.as_str(), "int" | "float" | "char" | "void")
}

fn is_function_header(tokens: &[Token]) -> bool {
    tokens.len() >= 5
        && tokens[0].kind == TokenKind::Keyword
        && tokens[1].kind == TokenKind::Ident
        && tokens[2].is("(")
        && has_text(tokens, ")")
        && has_text(tokens, "{")
}

fn is_control_header(tokens: &[Token]) -> bool {
    matches!(tokens[0].text.as_str(), "if" | "while" | "for" | "else") && has_text(tokens, "{")
}

fn is_else_header(tokens: &[Token]) -> bool {
    tokens[0].is("else") && has_text(tokens, "{")
}

/// Tokens inside the first parenthesized group of a control-flow header.
fn condition_tokens(tokens: &[Token]) -> &[Token] {
    let open = match tokens.iter().position(|t| t.is("(")) {
        Some(i) => i + 1,
        None => return &[],
    };

    match tokens[open..].iter().position(|t| t.is(")")) {
        Some(i) => &tokens[open..open + i],
        None => &[],
    }
}

/// Splits a `for` header into its init, condition and increment clauses.
/// Anything that does not carry exactly two semicolons between the outer
/// parentheses degrades to three empty clauses.
fn for_clauses(tokens: &[Token]) -> (Vec<Token>, Vec<Token>, Vec<Token>) {
    let open = tokens.iter().position(|t| t.is("("));
    let close = tokens.iter().rposition(|t| t.is(")"));

    let inner = match (open, close) {
        (Some(open), Some(close)) if open < close => &tokens[open + 1..close],
        _ => return (Vec::new(), Vec::new(), Vec::new()),
    };

    let breaks: Vec<usize> = inner
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is(";"))
        .map(|(i, _)| i)
        .collect();

    if breaks.len() != 2 {
        return (Vec::new(), Vec::new(), Vec::new());
    }

    (
        inner[..breaks[0]].to_vec(),
        inner[breaks[0] + 1..breaks[1]].to_vec(),
        inner[breaks[1] + 1..].to_vec(),
    )
}

fn argument_list(tokens: &[Token]) -> Vec<String> {
    tokens
        .iter()
        .filter(|t| !t.is(","))
        .map(|t| t.text.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn session(lines: &[&str]) -> Compiler {
        let mut compiler = Compiler::new();

        for (number, line) in lines.iter().enumerate() {
            compiler
                .parse_line(line, number + 1)
                .unwrap_or_else(|err| panic!("line {}: {}", number + 1, err));
        }

        compiler
    }

    fn error_of(lines: &[&str]) -> String {
        let mut compiler = Compiler::new();

        for (number, line) in lines.iter().enumerate() {
            if let Err(err) = compiler.parse_line(line, number + 1) {
                return err.to_string();
            }
        }

        panic!("expected a parse failure");
    }

    #[test]
    fn golden_main_translation() {
        let compiler = session(&["int main() {", "int x = 1 + 2 ;", "return x ;", "}"]);

        assert_eq!(
            compiler.intermediate_code(),
            ["func main:", "t1 = 1 + 2", "x = t1", "return x"]
        );
        compiler.validate_entry_point().unwrap();
    }

    #[test]
    fn function_header_registers_symbol_and_one_marker() {
        let compiler = session(&["int main() {"]);

        assert_eq!(compiler.symbol_table().get("main"), Some(&Symbol::Function));
        assert_eq!(compiler.intermediate_code(), ["func main:"]);
    }

    #[test]
    fn while_header_emits_labels_and_jumps_before_the_body() {
        let compiler = session(&["int main() {", "while (x < 10) {"]);

        assert_eq!(
            compiler.intermediate_code(),
            [
                "func main:",
                "L1:",
                "t1 = x < 10",
                "if t1 goto L2",
                "goto L3",
                "L2:",
            ]
        );
    }

    #[test]
    fn if_else_translation() {
        let compiler = session(&[
            "int main() {",
            "int x = 1 ;",
            "if (x < 2) {",
            "print(\"small\") ;",
            "}",
            "else {",
            "print(\"big\") ;",
            "}",
            "return 0 ;",
            "}",
        ]);

        assert_eq!(
            compiler.intermediate_code(),
            [
                "func main:",
                "x = 1",
                "t1 = x < 2",
                "if not t1 goto L1",
                "print(\"small\")",
                "goto L2",
                "L1:",
                "print(\"big\")",
                "L2:",
                "return 0",
            ]
        );
    }

    #[test]
    fn if_without_else_closes_at_its_end_label() {
        let compiler = session(&[
            "int main() {",
            "int x = 1 ;",
            "if (x < 2) {",
            "x = 3 ;",
            "}",
            "return x ;",
            "}",
        ]);

        assert_eq!(
            compiler.intermediate_code(),
            [
                "func main:",
                "x = 1",
                "t1 = x < 2",
                "if not t1 goto L1",
                "x = 3",
                "L2:",
                "return x",
            ]
        );
    }

    #[test]
    fn nested_if_keeps_the_outer_else_attached() {
        let compiler = session(&[
            "int main() {",
            "int a = 1 ;",
            "if (a > 0) {",
            "if (a > 1) {",
            "a = 2 ;",
            "}",
            "}",
            "else {",
            "a = 0 ;",
            "}",
            "return a ;",
            "}",
        ]);

        assert_eq!(
            compiler.intermediate_code(),
            [
                "func main:",
                "a = 1",
                "t1 = a > 0",
                "if not t1 goto L1",
                "t2 = a > 1",
                "if not t2 goto L3",
                "a = 2",
                "L4:",
                "goto L2",
                "L1:",
                "a = 0",
                "L2:",
                "return a",
            ]
        );
    }

    #[test]
    fn for_loop_translation() {
        let compiler = session(&[
            "int main() {",
            "for (int i = 0; i < 3; i = i + 1) {",
            "print(i) ;",
            "}",
            "return 0 ;",
            "}",
        ]);

        assert_eq!(
            compiler.intermediate_code(),
            [
                "func main:",
                "i = 0",
                "L1:",
                "t1 = i < 3",
                "if t1 goto L2",
                "goto L3",
                "L2:",
                "print(i)",
                "t2 = i + 1",
                "t3 = i = i + 1",
                "goto L1",
                "L3:",
                "return 0",
            ]
        );
        assert_eq!(compiler.symbol_table().get("i"), Some(&Symbol::Variable));
    }

    #[test]
    fn call_statement_allocates_a_temp() {
        let compiler = session(&["int main() {", "foo(a, b) ;"]);

        assert_eq!(
            compiler.intermediate_code(),
            ["func main:", "t1 = call foo(a, b)"]
        );
    }

    #[test]
    fn call_in_initializer_degrades_to_joined_text() {
        let compiler = session(&["int main() {", "int x = sum(num) ;"]);

        assert_eq!(
            compiler.intermediate_code(),
            ["func main:", "t1 = sum ( num )", "x = t1"]
        );
    }

    #[test]
    fn declaration_without_initializer_emits_nothing() {
        let compiler = session(&["int main() {", "int x ;"]);

        assert_eq!(compiler.symbol_table().get("x"), Some(&Symbol::Variable));
        assert_eq!(compiler.intermediate_code(), ["func main:"]);
    }

    #[test]
    fn bare_return() {
        let compiler = session(&["void wait() {", "return ;"]);

        assert_eq!(compiler.intermediate_code(), ["func wait:", "return"]);
    }

    #[test_case(&["}"], "syntax error at line 1: unmatched closing brace"; "brace with empty stack")]
    #[test_case(&["int main() {", "}", "}"], "syntax error at line 3: unmatched closing brace"; "brace after function closed")]
    #[test_case(&["int x = 1 ;"], "syntax error at line 1: not inside function block"; "statement outside function")]
    #[test_case(&["int main() {", "else {"], "syntax error at line 2: unexpected 'else' without matching 'if'"; "else without if")]
    #[test_case(&["int main() {", "int @ ;"], "syntax error at line 2: unexpected character '@'"; "lexical failure carries the line")]
    #[test_case(&["int main() {", "int int int"], "syntax error at line 2: int int int"; "unrecognized statement shape")]
    fn structural_failures(lines: &[&str], expected: &str) {
        assert_eq!(error_of(lines), expected);
    }

    #[test]
    fn stale_else_fails_after_the_if_was_sealed() {
        let err = error_of(&[
            "int main() {",
            "if (x < 1) {",
            "x = 2 ;",
            "}",
            "x = 3 ;",
            "else {",
        ]);

        assert_eq!(
            err,
            "syntax error at line 6: unexpected 'else' without matching 'if'"
        );
    }

    #[test]
    fn missing_main_fails_at_finalization() {
        let compiler = session(&["int helper() {", "return 0 ;", "}"]);

        assert_eq!(
            compiler.validate_entry_point().unwrap_err().to_string(),
            "program must define a 'main' function"
        );
    }

    #[test]
    fn reparsing_a_line_duplicates_its_effect() {
        let mut compiler = Compiler::new();

        compiler.parse_line("int main() {", 1).unwrap();
        compiler.parse_line("int x = 1 + 2 ;", 2).unwrap();
        compiler.parse_line("int x = 1 + 2 ;", 2).unwrap();

        assert_eq!(
            compiler.intermediate_code(),
            ["func main:", "t1 = 1 + 2", "x = t1", "t2 = 1 + 2", "x = t2"]
        );
        assert_eq!(compiler.symbol_table().len(), 2);
    }

    #[test]
    fn redeclaring_a_name_overwrites_its_role_in_place() {
        let compiler = session(&[
            "int helper() {",
            "}",
            "int main() {",
            "int helper = 1 ;",
            "}",
        ]);

        let entries: Vec<_> = compiler.symbol_table().iter().collect();
        assert_eq!(
            entries,
            [
                (&"helper".to_string(), &Symbol::Variable),
                (&"main".to_string(), &Symbol::Function),
            ]
        );
    }

    #[test]
    fn preprocessor_line_is_ignored() {
        let compiler = session(&["#include <stdio.h>", "int main() {"]);

        assert_eq!(compiler.intermediate_code(), ["func main:"]);
    }
}
