use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::{
    ConversationController, ConversationSnapshot, EntryId, Role, SendOutcome, SendTicket,
    SubmitRejection,
};

const USER_PREFIX: &str = "you> ";
const ASSISTANT_PREFIX: &str = "ai> ";
const REWRITE_PREFIX: &str = "  ↳ ";
const DISSOLVING_MARKER: &str = "~ dissolving conversation ~";
const CLEARED_MARKER: &str = "~ conversation cleared ~";

/// A line typed at the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Clear,
    Quit,
    Submit(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        match line.trim() {
            "/clear" => Self::Clear,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Submit(line),
        }
    }
}

/// Renders snapshot changes as an append-only transcript.
///
/// Remembers what it already printed for every entry so each update only writes
/// the difference: new entries, characters appended to an entry, or a rewritten tail.
#[derive(Debug, Default)]
pub struct TerminalView {
    printed: Vec<(EntryId, String)>,
    /// Entry whose text is still being written on the current line.
    open: Option<EntryId>,
    dissolving: bool,
}

impl TerminalView {
    pub fn render_update(
        &mut self,
        snapshot: &ConversationSnapshot,
        out: &mut impl Write,
    ) -> io::Result<()> {
        if snapshot.dissolving && !self.dissolving {
            self.close_line(out)?;
            writeln!(out, "{DISSOLVING_MARKER}")?;
            self.dissolving = true;
        }

        if !snapshot.dissolving && self.dissolving {
            self.close_line(out)?;
            writeln!(out, "{CLEARED_MARKER}")?;
            self.printed.clear();
            self.dissolving = false;
        }

        for entry in &snapshot.entries {
            let Some(index) = self.printed.iter().position(|(id, _)| *id == entry.id) else {
                self.close_line(out)?;
                match entry.role {
                    Role::User => {
                        writeln!(out, "{USER_PREFIX}{}", entry.content)?;
                    }
                    Role::Assistant => {
                        write!(out, "{ASSISTANT_PREFIX}{}", entry.content)?;
                        self.open = Some(entry.id);
                    }
                }
                self.printed.push((entry.id, entry.content.clone()));
                continue;
            };

            let printed = &self.printed[index].1;
            if *printed == entry.content {
                continue;
            }

            if let Some(suffix) = entry.content.strip_prefix(printed.as_str()) {
                if self.open != Some(entry.id) {
                    self.close_line(out)?;
                    write!(out, "{REWRITE_PREFIX}")?;
                    self.open = Some(entry.id);
                }
                write!(out, "{suffix}")?;
            } else {
                let common = common_prefix_len(printed, &entry.content);
                self.close_line(out)?;
                writeln!(out, "{REWRITE_PREFIX}{}", entry.content[common..].trim_start())?;
            }
            self.printed[index].1.clone_from(&entry.content);
        }

        out.flush()
    }

    fn close_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.open.take().is_some() {
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Byte length of the longest common prefix, on a char boundary of both strings.
fn common_prefix_len(left: &str, right: &str) -> usize {
    left.char_indices()
        .zip(right.chars())
        .find(|((_, a), b)| a != b)
        .map(|((offset, _), _)| offset)
        .unwrap_or_else(|| left.len().min(right.len()))
}

/// Runs the interactive loop until stdin closes or the user quits.
pub async fn run(controller: ConversationController) -> io::Result<()> {
    let mut updates = controller.subscribe();
    let render = tokio::spawn(async move {
        let mut view = TerminalView::default();
        loop {
            let snapshot = updates.borrow_and_update().clone();
            let rendered = view.render_update(&snapshot, &mut io::stdout().lock());
            if let Err(error) = rendered {
                tracing::warn!(%error, "failed to render conversation");
                break;
            }
            if updates.changed().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Quit => break,
            Command::Clear => {
                controller.clear();
            }
            Command::Submit(input) => match controller.submit(input) {
                Ok(ticket) => {
                    tokio::spawn(report_outcome(ticket));
                }
                Err(SubmitRejection::Blank) => {}
                Err(rejection) => println!("! {rejection}"),
            },
        }
    }

    render.abort();
    tracing::debug!("input closed, leaving");
    Ok(())
}

async fn report_outcome(ticket: SendTicket) {
    let user_entry = ticket.user_entry().0;
    match ticket.outcome().await {
        Ok(SendOutcome::Revealed { entry, proof_id }) => {
            tracing::debug!(user_entry, entry = entry.0, ?proof_id, "reply revealed");
        }
        Ok(SendOutcome::Cleared) => {
            tracing::debug!(user_entry, "send dropped by a clear");
        }
        Err(error) => {
            tracing::warn!(user_entry, %error, "send failed");
        }
    }
}
