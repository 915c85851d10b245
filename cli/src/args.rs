use std::convert::From;
use std::{env, fmt, path::PathBuf};

#[derive(Debug, Clone)]
enum Setting {
    Version,
    Help,
    Unknown(String),
}

const VERSION: &str = "--version";
const HELP: &str = "--help";

impl From<String> for Setting {
    fn from(value: String) -> Self {
        match value.as_str() {
            VERSION => Self::Version,
            HELP => Self::Help,
            string => Self::Unknown(string.to_owned()),
        }
    }
}

#[derive(Debug, Clone)]
enum Token {
    Setting(Setting),
    Path(PathBuf),
}

fn lex(iter: &mut env::Args) -> Vec<Token> {
    iter.next();
    let mut tokens = vec![];
    for string in iter {
        match string.as_str() {
            x if x.starts_with("--") => tokens.push(Token::Setting(Setting::from(string))),
            path => tokens.push(Token::Path(PathBuf::from(path))),
        }
    }
    tokens
}

#[derive(Debug, Clone)]
struct Args {
    settings: Vec<Setting>,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum ParseError {
    ExpectedPathOrSetting(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectedPathOrSetting(string) => {
                write!(f, "expected a file path or a setting, found \"{string}\"")
            }
        }
    }
}

fn parse(tokens: Vec<Token>) -> Result<Args, ParseError> {
    let mut iter = tokens.into_iter().peekable();
    let mut settings = vec![];
    while let Some(Token::Setting(_)) = iter.peek() {
        match iter.next() {
            Some(Token::Setting(Setting::Unknown(string))) => {
                return Err(ParseError::ExpectedPathOrSetting(string))
            }
            Some(Token::Setting(setting)) => settings.push(setting),
            _ => unreachable!(),
        }
    }
    let path = match iter.next() {
        Some(Token::Path(path)) => Some(path),
        Some(Token::Setting(Setting::Unknown(string))) => {
            return Err(ParseError::ExpectedPathOrSetting(string))
        }
        _ => None,
    };
    Ok(Args { settings, path })
}

#[derive(Debug, Clone)]
pub enum EvalMode {
    File(PathBuf),
    Repl,
}

#[derive(Clone)]
pub enum Action {
    Eval(EvalMode),
    Version,
    Help,
}

impl From<Args> for Action {
    fn from(value: Args) -> Self {
        for setting in value.settings {
            match setting {
                Setting::Help => return Self::Help,
                Setting::Version => return Self::Version,
                Setting::Unknown(_) => unreachable!("filtered out during parse"),
            }
        }
        match value.path {
            Some(path) => Self::Eval(EvalMode::File(path)),
            None => Self::Eval(EvalMode::Repl),
        }
    }
}

pub fn get_action() -> Result<Action, ParseError> {
    let tokens = lex(&mut env::args());
    let args = parse(tokens)?;
    Ok(Action::from(args))
}
