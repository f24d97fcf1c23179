//! Parameter sources.
//!
//! The provisioning workflow never talks to a terminal directly. It asks a
//! [`ParamSource`] at well-defined decision points and the source decides how
//! the answer is produced: interactively from a wizard prompt, or
//! deterministically from a scripted queue.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use strata_core::{ProvisionError, ProvisionResult};

/// A validation hook applied to a candidate answer.
pub type Check<'a, T> = &'a dyn Fn(&T) -> ProvisionResult<()>;

/// A check which accepts anything.
pub fn any_string(_: &str) -> ProvisionResult<()> {
    Ok(())
}

/// A check which rejects empty values.
pub fn not_empty(value: &str) -> ProvisionResult<()> {
    if value.is_empty() {
        return Err(ProvisionError::InvalidInput("empty value is not allowed".into()));
    }
    Ok(())
}

/// A source of user-supplied parameters.
pub trait ParamSource: Send {
    /// Whether decision points may be re-entered after a recoverable failure.
    ///
    /// Only a real terminal can sensibly ask again; scripted sources answer
    /// each question at most once and fail closed instead.
    fn can_reprompt(&self) -> bool {
        false
    }

    /// Ask for a string value.
    fn ask_string(&mut self, title: &str, description: &str, default: Option<&str>, check: Check<'_, str>) -> ProvisionResult<String>;

    /// Ask for an integer value.
    fn ask_int(&mut self, title: &str, description: &str, default: Option<i64>, check: Check<'_, i64>) -> ProvisionResult<i64>;

    /// Ask for a secret, without echoing it back.
    fn ask_password(&mut self, title: &str) -> ProvisionResult<String>;

    /// Ask to pick one of the given options, returning its index.
    fn choose(&mut self, title: &str, description: &str, options: &[String], default: Option<usize>) -> ProvisionResult<usize>;

    /// Ask a yes/no question.
    fn confirm(&mut self, title: &str, default: bool) -> ProvisionResult<bool>;
}

fn blue(s: &str) -> String {
    format!("\x1b[94m{}\x1b[0m", s)
}

fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}

fn yellow(s: &str) -> String {
    format!("\x1b[33m{}\x1b[0m", s)
}

/// Interactive terminal prompts.
///
/// Re-asks until the answer validates, so a returned value is always valid.
pub struct InteractivePrompt;

impl InteractivePrompt {
    fn header(&self, title: &str, description: &str, has_default: bool) {
        println!("\n{} {}", blue(title), if has_default { "(enter to use default)" } else { "" });
        if !description.is_empty() {
            println!("{}", description);
        }
    }

    fn read_line(&self, default: Option<&str>) -> ProvisionResult<String> {
        match default {
            Some(default) => print!("[{}] > ", red(default)),
            None => print!("> "),
        }
        io::stdout().flush().ok();
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|err| ProvisionError::InvalidInput(format!("error reading input: {}", err)))?;
        let line = line.trim().to_string();
        match (line.is_empty(), default) {
            (true, Some(default)) => Ok(default.to_string()),
            _ => Ok(line),
        }
    }
}

impl ParamSource for InteractivePrompt {
    fn can_reprompt(&self) -> bool {
        true
    }

    fn ask_string(&mut self, title: &str, description: &str, default: Option<&str>, check: Check<'_, str>) -> ProvisionResult<String> {
        self.header(title, description, default.is_some());
        loop {
            let answer = self.read_line(default)?;
            match check(&answer) {
                Ok(()) => return Ok(answer),
                Err(err) => println!("\n{}\n", yellow(&err.to_string())),
            }
        }
    }

    fn ask_int(&mut self, title: &str, description: &str, default: Option<i64>, check: Check<'_, i64>) -> ProvisionResult<i64> {
        self.header(title, description, default.is_some());
        let default = default.map(|d| d.to_string());
        loop {
            let answer = self.read_line(default.as_deref())?;
            let value: i64 = match answer.parse() {
                Ok(value) => value,
                Err(_) => {
                    println!("\nExpecting an integer value but got {:?}", answer);
                    continue;
                }
            };
            match check(&value) {
                Ok(()) => return Ok(value),
                Err(err) => println!("\n{}\n", yellow(&err.to_string())),
            }
        }
    }

    fn ask_password(&mut self, title: &str) -> ProvisionResult<String> {
        self.header(title, "", false);
        print!("> ");
        io::stdout().flush().ok();
        read_hidden_line().map_err(|err| ProvisionError::InvalidInput(format!("error reading password: {}", err)))
    }

    fn choose(&mut self, title: &str, description: &str, options: &[String], default: Option<usize>) -> ProvisionResult<usize> {
        self.header(title, description, default.is_some());
        let default = default.map(|d| d.to_string());
        loop {
            for (idx, option) in options.iter().enumerate() {
                println!(" [{}] - {}", red(&idx.to_string()), option);
            }
            let answer = self.read_line(default.as_deref())?;
            match answer.parse::<usize>() {
                Ok(idx) if idx < options.len() => return Ok(idx),
                _ => println!("\nInvalid option: {}, options are: 0 to {}", red(&answer), options.len() - 1),
            }
        }
    }

    fn confirm(&mut self, title: &str, default: bool) -> ProvisionResult<bool> {
        self.header(title, "", true);
        let default = if default { "y" } else { "n" };
        loop {
            println!(" [{}] - yes", red("y"));
            println!(" [{}] - no", red("n"));
            let answer = self.read_line(Some(default))?;
            match answer.as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                other => println!("\nInvalid option: {}, options are: y or n", red(other)),
            }
        }
    }
}

/// Read one line from stdin with terminal echo disabled.
fn read_hidden_line() -> io::Result<String> {
    let fd = libc::STDIN_FILENO;
    let mut saved = std::mem::MaybeUninit::<libc::termios>::uninit();
    let have_term = unsafe { libc::tcgetattr(fd, saved.as_mut_ptr()) } == 0;
    let saved = if have_term {
        let saved = unsafe { saved.assume_init() };
        let mut hidden = saved;
        hidden.c_lflag &= !libc::ECHO;
        unsafe { libc::tcsetattr(fd, libc::TCSANOW, &hidden) };
        Some(saved)
    } else {
        None
    };

    let mut line = String::new();
    let res = io::stdin().lock().read_line(&mut line);

    if let Some(saved) = saved {
        unsafe { libc::tcsetattr(fd, libc::TCSANOW, &saved) };
        println!();
    }
    res?;
    Ok(line.trim().to_string())
}

/// A deterministic parameter source backed by a queue of answers.
///
/// Never prompts. An invalid or missing answer is an error rather than a
/// re-ask, so scripted runs fail closed.
#[derive(Default)]
pub struct ScriptedParams {
    answers: VecDeque<String>,
}

impl ScriptedParams {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { answers: answers.into_iter().map(Into::into).collect() }
    }

    fn next(&mut self, title: &str) -> ProvisionResult<String> {
        self.answers
            .pop_front()
            .ok_or_else(|| ProvisionError::InvalidInput(format!("no scripted answer available for: {}", title)))
    }
}

impl ParamSource for ScriptedParams {
    fn ask_string(&mut self, title: &str, _description: &str, default: Option<&str>, check: Check<'_, str>) -> ProvisionResult<String> {
        let answer = match (self.next(title), default) {
            (Ok(answer), Some(default)) if answer.is_empty() => default.to_string(),
            (Ok(answer), _) => answer,
            (Err(err), None) => return Err(err),
            (Err(_), Some(default)) => default.to_string(),
        };
        check(&answer)?;
        Ok(answer)
    }

    fn ask_int(&mut self, title: &str, _description: &str, default: Option<i64>, check: Check<'_, i64>) -> ProvisionResult<i64> {
        let answer = match (self.next(title), default) {
            (Ok(answer), Some(default)) if answer.is_empty() => default,
            (Ok(answer), _) => answer
                .parse()
                .map_err(|_| ProvisionError::InvalidInput(format!("expecting an integer value but got {:?}", answer)))?,
            (Err(err), None) => return Err(err),
            (Err(_), Some(default)) => default,
        };
        check(&answer)?;
        Ok(answer)
    }

    fn ask_password(&mut self, title: &str) -> ProvisionResult<String> {
        self.next(title)
    }

    fn choose(&mut self, title: &str, _description: &str, options: &[String], default: Option<usize>) -> ProvisionResult<usize> {
        let answer = match (self.next(title), default) {
            (Ok(answer), Some(default)) if answer.is_empty() => default,
            (Ok(answer), _) => answer
                .parse()
                .map_err(|_| ProvisionError::InvalidInput(format!("invalid option for {}: {:?}", title, answer)))?,
            (Err(err), None) => return Err(err),
            (Err(_), Some(default)) => default,
        };
        if answer >= options.len() {
            return Err(ProvisionError::InvalidInput(format!("invalid option for {}: {}", title, answer)));
        }
        Ok(answer)
    }

    fn confirm(&mut self, title: &str, default: bool) -> ProvisionResult<bool> {
        match self.next(title) {
            Ok(answer) if answer.is_empty() => Ok(default),
            Ok(answer) => match answer.as_str() {
                "y" | "yes" => Ok(true),
                "n" | "no" => Ok(false),
                other => Err(ProvisionError::InvalidInput(format!("invalid answer for {}: {:?}", title, other))),
            },
            Err(_) => Ok(default),
        }
    }
}
