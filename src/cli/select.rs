//! Interactive choice of the US stock data source.

use crate::core::manager::SourceManager;
use crate::core::quote::Market;
use crate::core::source::DataSourceType;
use anyhow::Result;
use console::Term;
use std::io::IsTerminal;

/// Maps a 1-based answer onto an index; blank, invalid or out of range input
/// picks the first option.
pub fn parse_choice(input: &str, options: usize) -> usize {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=options).contains(&n) => n - 1,
        _ => 0,
    }
}

/// Asks which adapter should serve US stocks. Returns `None` without asking
/// when stdin is not a terminal or there is nothing to choose between.
pub fn prompt_us_source(manager: &SourceManager) -> Result<Option<DataSourceType>> {
    let candidates = manager.available_sources(Some(Market::Us));
    if candidates.len() < 2 || !std::io::stdin().is_terminal() {
        return Ok(None);
    }

    let term = Term::stderr();
    term.write_line("Select a data source for US stocks:")?;
    for (i, source) in candidates.iter().enumerate() {
        term.write_line(&format!("  {}. {}", i + 1, source.name()))?;
    }
    term.write_str(&format!("Choice [1-{}, default 1]: ", candidates.len()))?;
    let answer = term.read_line()?;

    let chosen = &candidates[parse_choice(&answer, candidates.len())];
    term.write_line(&format!("Using {}", chosen.name()))?;
    Ok(Some(chosen.source_type()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("2", 3), 1);
        assert_eq!(parse_choice(" 3 \n", 3), 2);
        assert_eq!(parse_choice("", 3), 0);
        assert_eq!(parse_choice("yahoo", 3), 0);
        assert_eq!(parse_choice("0", 3), 0);
        assert_eq!(parse_choice("4", 3), 0);
    }
}
