use std::io::{self, BufRead, Write};

/// Interactive console used by the setup flow. Calls block, so async callers
/// run them on a blocking thread.
pub trait CredentialPrompt: Send + Sync {
    /// Ask for the password of `user`.
    fn read_password(&self, user: &str) -> io::Result<String>;

    /// Block until the operator acknowledges, before the process exits.
    fn pause(&self);
}

/// Blocking stdin/stdout implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt;

impl CredentialPrompt for StdinPrompt {
    fn read_password(&self, user: &str) -> io::Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "Enter password for user '{user}': ")?;
        stdout.flush()?;
        read_trimmed_line(&mut io::stdin().lock())
    }

    fn pause(&self) {
        println!("\nPress Enter to exit...");
        let _ = read_trimmed_line(&mut io::stdin().lock());
    }
}

fn read_trimmed_line(reader: &mut impl BufRead) -> io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
