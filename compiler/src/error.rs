use colored::Colorize;
use lexer::token::Token;
use std::fmt;

/// Errors the compiler can raise while producing a `Chunk`. The compiler
/// keeps going after each one (single-token lookahead, panic-mode
/// recovery) so a single pass can surface several.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A generic "expected X, found token" error for ordinary syntax
    /// mistakes (missing `;`, missing `)`, a statement starting with a
    /// token that has no prefix rule, and so on).
    Expected { what: String, found: Token },
    /// The lexer itself flagged the token (unterminated string, stray
    /// character); its lexeme already carries the message.
    LexError(Token),
    TooManyConstants,
    TooManyLocals,
    JumpTooLarge,
    InvalidAssignmentTarget(Token),
    DuplicateLocal(String, Token),
    ReadOwnInitializer(String, Token),
    AssignToLocalConst(String, Token),
    /// A global declared `const` earlier in the same compile pass is
    /// reassigned later in that same pass (spec.md §8 scenario 3). A const
    /// global from a *previous* `interpret()` call is instead caught by the
    /// VM's `SetGlobal` handler as `RuntimeError::AssignConstGlobal`.
    AssignToConstGlobal(String, Token),
}

impl CompileError {
    pub fn token(&self) -> Option<&Token> {
        match self {
            CompileError::Expected { found, .. } => Some(found),
            CompileError::LexError(t) => Some(t),
            CompileError::InvalidAssignmentTarget(t) => Some(t),
            CompileError::DuplicateLocal(_, t) => Some(t),
            CompileError::ReadOwnInitializer(_, t) => Some(t),
            CompileError::AssignToLocalConst(_, t) => Some(t),
            CompileError::AssignToConstGlobal(_, t) => Some(t),
            CompileError::TooManyConstants | CompileError::TooManyLocals | CompileError::JumpTooLarge => None,
        }
    }

    fn message(&self) -> String {
        match self {
            CompileError::Expected { what, found } => format!("Expected {what}, found {found}."),
            CompileError::LexError(t) => t.lexeme.clone(),
            CompileError::TooManyConstants => "Too many constants in one chunk.".to_owned(),
            CompileError::TooManyLocals => "Too many local variables in one scope.".to_owned(),
            CompileError::JumpTooLarge => "Too much code to jump over.".to_owned(),
            CompileError::InvalidAssignmentTarget(_) => "Invalid assignment target.".to_owned(),
            CompileError::DuplicateLocal(name, _) => {
                format!("A variable named '{name}' already exists in this scope.")
            }
            CompileError::ReadOwnInitializer(name, _) => {
                format!("Can't read local variable '{name}' in its own initializer.")
            }
            CompileError::AssignToLocalConst(name, _) => {
                format!("Can't assign to a constant variable '{name}'.")
            }
            CompileError::AssignToConstGlobal(name, _) => {
                format!("Can't assign to a constant variable '{name}'.")
            }
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token() {
            Some(token) => write!(
                f,
                "{} at {}: {}",
                "Error".red().bold(),
                token,
                self.message()
            ),
            None => write!(f, "{} {}", "Error:".red().bold(), self.message()),
        }
    }
}

impl std::error::Error for CompileError {}

/// Errors the VM can raise while executing a `Chunk`. Each carries the
/// source line the offending instruction came from (read from the chunk's
/// line map at `ip - 1`), since there's no richer call-stack to unwind.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    NotANumber(u32),
    AddTypeMismatch(u32),
    UndefinedGlobal(String, u32),
    AssignUndefinedGlobal(String, u32),
    AssignConstGlobal(String, u32),
    StackOverflow(u32),
}

impl RuntimeError {
    pub fn line(&self) -> u32 {
        match self {
            RuntimeError::NotANumber(l)
            | RuntimeError::AddTypeMismatch(l)
            | RuntimeError::UndefinedGlobal(_, l)
            | RuntimeError::AssignUndefinedGlobal(_, l)
            | RuntimeError::AssignConstGlobal(_, l)
            | RuntimeError::StackOverflow(l) => *l,
        }
    }

    fn message(&self) -> String {
        match self {
            RuntimeError::NotANumber(_) => "Operand must be a number.".to_owned(),
            RuntimeError::AddTypeMismatch(_) => {
                "You can only add string(concat) or numbers(binary)".to_owned()
            }
            RuntimeError::UndefinedGlobal(name, _) => format!("Undefined variable '{name}'."),
            RuntimeError::AssignUndefinedGlobal(name, _) => {
                format!("Can't assign to undefined variable '{name}'.")
            }
            RuntimeError::AssignConstGlobal(name, _) => {
                format!("Can't assign to a constant variable '{name}'.")
            }
            RuntimeError::StackOverflow(_) => "Stack overflow.".to_owned(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}\n[line {}] in script",
            "Runtime error:".red().bold(),
            self.message(),
            self.line()
        )
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_display_includes_token() {
        let token = Token::new(lexer::token::TokenType::Identifier, "k", 3);
        let err = CompileError::AssignToLocalConst("k".to_owned(), token);
        let rendered = format!("{err}");
        assert!(rendered.contains("k"));
    }

    #[test]
    fn runtime_error_display_includes_line() {
        let err = RuntimeError::UndefinedGlobal("x".to_owned(), 42);
        let rendered = format!("{err}");
        assert!(rendered.contains("42"));
        assert!(rendered.contains('x'));
    }
}
