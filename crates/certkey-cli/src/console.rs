use certkey_core::certificate::SigningCertificate;
use certkey_core::{Severity, UserInteraction};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Terminal prompts on stderr; only key material goes to stdout.
#[derive(Debug, Default)]
pub struct ConsoleInteraction;

impl ConsoleInteraction {
    fn read_line(prompt: &str) -> Option<String> {
        eprint!("{prompt}");
        io::stderr().flush().ok()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

/// 1-based menu answer to a candidate index. Empty or `q` cancels.
pub fn parse_selection(answer: &str, candidates: usize) -> Option<usize> {
    let answer = answer.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("q") {
        return None;
    }
    let choice: usize = answer.parse().ok()?;
    (1..=candidates).contains(&choice).then(|| choice - 1)
}

impl UserInteraction for ConsoleInteraction {
    fn select_certificate(&self, candidates: &[Arc<dyn SigningCertificate>]) -> Option<usize> {
        eprintln!("Available certificates:");
        for (i, cert) in candidates.iter().enumerate() {
            eprintln!("  [{}] {}  ({})", i + 1, cert.subject(), cert.thumbprint());
        }
        loop {
            let answer = Self::read_line("Select certificate (number, empty to cancel): ")?;
            if answer.is_empty() || answer.eq_ignore_ascii_case("q") {
                return None;
            }
            match parse_selection(&answer, candidates.len()) {
                Some(index) => return Some(index),
                None => eprintln!("Enter a number between 1 and {}.", candidates.len()),
            }
        }
    }

    fn enter_recovery_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var("CERTKEY_RECOVERY_KEY") {
            if !key.is_empty() {
                return Some(key);
            }
        }
        match rpassword::prompt_password("Recovery key (hex, empty to cancel): ") {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => None,
        }
    }

    fn show_recovery_key(&self, hex: &str) {
        eprintln!();
        eprintln!("RECOVERY KEY - store it somewhere safe, it is shown only once:");
        eprintln!();
        for chunk in hex.as_bytes().chunks(64) {
            eprintln!("  {}", String::from_utf8_lossy(chunk));
        }
        eprintln!();
    }

    fn notify(&self, message: &str, severity: Severity) {
        eprintln!("{severity}: {message}");
    }
}
