//! Interactive first-time setup: layout, credentials and one host per grid cell.

use std::io::{self, BufRead, Write};
use std::net::{Ipv4Addr, ToSocketAddrs};
use std::path::Path;

use tg_core::constants::DEFAULT_CAMERA_HOST;
use tg_core::error::{Result, TgError};
use tg_core::types::GridLayout;

use crate::loader::save_config;
use crate::schema::{AppConfig, CameraConfig, Credentials};

const SKIP_KEYWORD: &str = "skip";

/// Line-oriented prompts over any reader/writer pair.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// One trimmed line; end of input means the user aborted.
    fn ask(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(TgError::SetupInterrupted);
        }
        Ok(line.trim().to_string())
    }

    fn say(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", message)?;
        Ok(())
    }

    pub fn positive_integer(&mut self, prompt: &str, default: u32, accept_zero: bool) -> Result<u32> {
        loop {
            let answer = self.ask(&format!("{} [{}]: ", prompt, default))?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.parse::<u32>() {
                Ok(0) if accept_zero => return Ok(0),
                Ok(n) if n >= 1 => return Ok(n),
                _ => self.say("Please enter a valid integer.")?,
            }
        }
    }

    pub fn non_empty(&mut self, prompt: &str) -> Result<String> {
        loop {
            let answer = self.ask(prompt)?;
            if !answer.is_empty() {
                return Ok(answer);
            }
        }
    }

    /// A validated host, or `None` when the user typed `skip`.
    pub fn host(&mut self, prompt: &str, default: &str) -> Result<Option<String>> {
        loop {
            let answer = self.ask(&format!("{} [{}]: ", prompt, default))?;
            if answer.eq_ignore_ascii_case(SKIP_KEYWORD) {
                return Ok(None);
            }
            let host = if answer.is_empty() { default.to_string() } else { answer };
            if is_valid_host(&host) {
                return Ok(Some(host));
            }
            self.say("Please enter a valid IP address or hostname.")?;
        }
    }
}

/// IPv4 literal (optionally with `:port`) or a hostname resolving to IPv4.
pub fn is_valid_host(input: &str) -> bool {
    let host = input.split(':').next().unwrap_or_default().trim();
    if host.is_empty() {
        return false;
    }
    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return host.parse::<Ipv4Addr>().is_ok();
    }
    (host, 0u16)
        .to_socket_addrs()
        .map(|mut addrs| addrs.any(|a| a.is_ipv4()))
        .unwrap_or(false)
}

pub fn camera_id(row: u32, col: u32) -> String {
    format!("camera{}-{}", row, col)
}

/// Asks for everything setup owns and merges it into `base`.
pub fn collect<R: BufRead, W: Write>(prompter: &mut Prompter<R, W>, base: AppConfig) -> Result<AppConfig> {
    let rows = prompter.positive_integer("Please enter the number of rows for cameras", 2, false)?;
    let cols = prompter.positive_integer("Please enter the number of columns for cameras", 3, false)?;

    let user = prompter.non_empty("Please enter your camera account ID: ")?;
    let password = prompter.non_empty("Please enter your camera account password: ")?;

    prompter.say(&format!(
        "Enter one IP address or hostname per grid cell (type '{}' to leave a cell empty).",
        SKIP_KEYWORD
    ))?;
    let cameras = loop {
        let mut cameras = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                let id = camera_id(row, col);
                let host = prompter.host(&format!("IP address or hostname for {}", id), DEFAULT_CAMERA_HOST)?;
                cameras.push(CameraConfig {
                    id,
                    host: host.unwrap_or_default(),
                    url: None,
                });
            }
        }
        if cameras.iter().any(|c| !c.host.is_empty()) {
            break cameras;
        }
        prompter.say("Please enter at least one host IP address or hostname.")?;
    };

    Ok(AppConfig {
        layout: GridLayout::new(rows, cols),
        credentials: Credentials { user, password },
        cameras,
        ..base
    })
}

/// Runs setup on the terminal and writes the result to `path`.
pub fn run_interactive(path: &Path, base: AppConfig) -> Result<AppConfig> {
    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());
    let config = collect(&mut prompter, base)?;
    save_config(path, &config)?;
    println!("Configuration saved to {}", path.display());
    Ok(config)
}
