//! Terminal chat console
//!
//! Reads stdin lines and turns them into commands for the session loop.

use super::SessionEvent;
use log::debug;
use std::io::{self, BufRead};
use std::thread;
use tokio::sync::mpsc;

const RESET: &str = "\x1b[0m";
const GREEN: &str = "\x1b[32m";
const BLUE: &str = "\x1b[34m";
const YELLOW: &str = "\x1b[33m";

/// One line of console input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Plain text for the room
    Say(String),
    /// `/call`: start negotiation
    Call,
    /// `/peers`: list room members
    Peers,
    /// `/quit`: ordered shutdown
    Quit,
    /// Anything else starting with `/`
    Unknown(String),
}

impl ChatCommand {
    /// Parse a console line; blank lines yield `None`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let command = match line {
            "/call" => ChatCommand::Call,
            "/peers" => ChatCommand::Peers,
            "/quit" => ChatCommand::Quit,
            other if other.starts_with('/') => ChatCommand::Unknown(other.to_string()),
            other => ChatCommand::Say(other.to_string()),
        };
        Some(command)
    }
}

/// Forward stdin lines to the session loop until EOF.
///
/// Reads on a plain OS thread: a pending stdin read cannot be cancelled, and
/// the runtime must be able to shut down while the console sits idle.
pub fn spawn_console(events: mpsc::UnboundedSender<SessionEvent>) -> io::Result<thread::JoinHandle<()>> {
    spawn_reader(io::BufReader::new(io::stdin()), events)
}

fn spawn_reader<R>(input: R, events: mpsc::UnboundedSender<SessionEvent>) -> io::Result<thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("chat-console".to_string())
        .spawn(move || forward_lines(input, &events))
}

fn forward_lines<R: BufRead>(input: R, events: &mpsc::UnboundedSender<SessionEvent>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                debug!("Console read failed: {}", e);
                return;
            }
        };
        if let Some(command) = ChatCommand::parse(&line) {
            if events.send(SessionEvent::Chat(command)).is_err() {
                return;
            }
        }
    }
    debug!("Console input closed");
}

pub fn print_banner(name: &str, room: &str) {
    println!("{}=== LumenRTC chat: {} in room {} ==={}", GREEN, name, room, RESET);
    println!("Type a message to chat. /call starts video, /peers lists members, /quit exits.");
}

pub fn print_incoming(sender: &str, message: &str) {
    println!("{}[{}]: {}{}", BLUE, sender, message, RESET);
}

pub fn print_notice(text: &str) {
    println!("{}{}{}", YELLOW, text, RESET);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_text() {
        assert_eq!(ChatCommand::parse("  /call "), Some(ChatCommand::Call));
        assert_eq!(ChatCommand::parse("/peers"), Some(ChatCommand::Peers));
        assert_eq!(ChatCommand::parse("/quit"), Some(ChatCommand::Quit));
        assert_eq!(ChatCommand::parse("/hangup"), Some(ChatCommand::Unknown("/hangup".to_string())));
        assert_eq!(ChatCommand::parse("hello there"), Some(ChatCommand::Say("hello there".to_string())));
        assert_eq!(ChatCommand::parse("   "), None);
    }

    #[test]
    fn forwards_commands_until_eof() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = io::Cursor::new("hello\n\n/call\n/quit\n");
        spawn_reader(input, tx).unwrap().join().unwrap();

        let mut commands = Vec::new();
        while let Ok(SessionEvent::Chat(command)) = rx.try_recv() {
            commands.push(command);
        }
        assert_eq!(
            commands,
            vec![ChatCommand::Say("hello".to_string()), ChatCommand::Call, ChatCommand::Quit]
        );
    }

    #[test]
    fn runtime_shuts_down_while_console_is_idle() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        // held open so the console never sees EOF
        let (idle_input, _keep_open) = pipe_reader();
        runtime.block_on(async move {
            spawn_reader(idle_input, tx).unwrap();
        });

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            drop(runtime);
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok(),
            "runtime shutdown blocked on the console"
        );
    }

    /// A reader that blocks until its writer is dropped
    fn pipe_reader() -> (io::BufReader<BlockingReader>, std::sync::mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (io::BufReader::new(BlockingReader(rx)), tx)
    }

    struct BlockingReader(std::sync::mpsc::Receiver<Vec<u8>>);

    impl io::Read for BlockingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }
}
