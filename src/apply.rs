//! Reapply stored corrections to the source text.
//!
//! Every correction is matched against the text as it stands after the
//! corrections before it, starting from the beginning each time. A miss never
//! stops the batch.
use crate::store::Correction;
use anyhow::{Context, Result};
use crossterm::style::{style, Stylize};
use std::fmt;
use std::io::{BufRead, Write};

/// Outcome of a bulk apply.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplySummary {
    pub applied: usize,
    /// Reasons of corrections whose `old` text was not found.
    pub failed: Vec<String>,
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed.is_empty() {
            return write!(f, "Applied {} correction(s).", self.applied);
        }
        write!(
            f,
            "Applied {} correction(s), {} failed:",
            self.applied,
            self.failed.len()
        )?;
        for reason in &self.failed {
            write!(f, "\n  - {reason}")?;
        }
        Ok(())
    }
}

/// Outcome of an interactive review.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReviewSummary {
    pub applied: usize,
    /// Declined and unmatched corrections together.
    pub skipped: usize,
}

impl fmt::Display for ReviewSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Applied {} correction(s), skipped {}.",
            self.applied, self.skipped
        )
    }
}

/// A matched correction awaiting an operator decision.
#[derive(Debug)]
pub struct Candidate<'a> {
    pub index: usize,
    pub total: usize,
    pub correction: &'a Correction,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Source of yes/no decisions during review.
pub trait Confirm {
    fn confirm(&mut self, candidate: &Candidate<'_>) -> Result<bool>;
}

/// Byte range of the first literal occurrence of `old`. Empty `old` never matches.
fn find_first(text: &str, old: &str) -> Option<(usize, usize)> {
    if old.is_empty() {
        return None;
    }
    text.find(old).map(|start| (start, start + old.len()))
}

/// Apply every correction that matches.
pub fn apply_all(text: &mut String, corrections: &[Correction]) -> ApplySummary {
    let mut summary = ApplySummary::default();
    for correction in corrections {
        match find_first(text, &correction.old) {
            Some((start, end)) => {
                text.replace_range(start..end, &correction.new);
                summary.applied += 1;
            }
            None => {
                tracing::debug!(old = %correction.old, "correction did not match");
                summary.failed.push(correction.reason.clone());
            }
        }
    }
    summary
}

/// Ask `confirm` about each matching correction and apply the accepted ones.
pub fn apply_interactive<C: Confirm + ?Sized>(
    text: &mut String,
    corrections: &[Correction],
    confirm: &mut C,
) -> Result<ReviewSummary> {
    let mut summary = ReviewSummary::default();
    let total = corrections.len();
    for (index, correction) in corrections.iter().enumerate() {
        let Some((start, end)) = find_first(text, &correction.old) else {
            summary.skipped += 1;
            continue;
        };
        let candidate = Candidate {
            index,
            total,
            correction,
            text: text.as_str(),
            start,
            end,
        };
        if confirm.confirm(&candidate)? {
            text.replace_range(start..end, &correction.new);
            summary.applied += 1;
        } else {
            summary.skipped += 1;
        }
    }
    Ok(summary)
}

/// Terminal prompt that shows the matched line with the span highlighted.
pub struct TerminalConfirm<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn render(&mut self, candidate: &Candidate<'_>) -> Result<()> {
        let text = candidate.text;
        let line_start = text[..candidate.start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = text[candidate.end..]
            .find('\n')
            .map_or(text.len(), |i| candidate.end + i);
        let line_no = text[..candidate.start].matches('\n').count() + 1;
        let correction = candidate.correction;
        writeln!(
            self.output,
            "\n[{}/{}] line {}: {}",
            candidate.index + 1,
            candidate.total,
            line_no,
            correction.reason
        )?;
        writeln!(
            self.output,
            "  {}{}{}",
            &text[line_start..candidate.start],
            style(&text[candidate.start..candidate.end]).reverse(),
            &text[candidate.end..line_end]
        )?;
        writeln!(self.output, "  - {}", style(&correction.old).red())?;
        writeln!(self.output, "  + {}", style(&correction.new).green())?;
        Ok(())
    }
}

impl<R: BufRead, W: Write> Confirm for TerminalConfirm<R, W> {
    fn confirm(&mut self, candidate: &Candidate<'_>) -> Result<bool> {
        self.render(candidate).context("write review prompt")?;
        loop {
            write!(self.output, "Apply? [y/n] ")?;
            self.output.flush()?;
            let mut line = String::new();
            let read = self
                .input
                .read_line(&mut line)
                .context("read review answer")?;
            if read == 0 {
                return Ok(false);
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(self.output, "Please answer y or n.")?,
            }
        }
    }
}
