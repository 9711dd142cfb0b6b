//! Interactive selection from the terminal.
//!
//! Each line moves one of the two selectors. Whenever the selection actually
//! changes, the affected slice is resolved and rendered again. Acquisition is
//! asked for the field on every change too, but the cache makes that free.

use std::sync::Arc;

use aerosol_forecast::{
    selection::format_valid_time, Archive, Clock, ForecastField, SelectionChange, SelectionState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::pipeline::Pipeline;

const HELP: &str = "\
Commands:
  level <hPa>          select the pressure level nearest to <hPa>
  up | down            next higher / lower pressure level
  time <index>         select the valid time at <index> (see `axes`)
  time <MM/DD HH:MM>   select the valid time with this label
  next | prev          next / previous valid time
  show                 render the current selection again
  axes                 list the available levels and valid times
  help                 show this message
  quit                 leave";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Change(SelectionChange),
    Show,
    Axes,
    Help,
    Quit,
}

/// Parse one input line. Times are checked against the options in `state`.
pub fn parse_command(line: &str, state: &SelectionState) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word.to_lowercase().as_str() {
        "level" | "l" => {
            let level: f64 = rest
                .parse()
                .map_err(|_| format!("'{rest}' is not a pressure level"))?;
            Command::Change(SelectionChange::Level(level))
        }
        "up" => Command::Change(SelectionChange::LevelUp),
        "down" => Command::Change(SelectionChange::LevelDown),
        "time" | "t" => Command::Change(parse_time(rest, state)?),
        "next" | "n" => Command::Change(SelectionChange::NextTime),
        "prev" | "p" => Command::Change(SelectionChange::PrevTime),
        "show" | "s" => Command::Show,
        "axes" | "a" => Command::Axes,
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        "" => return Err("type `help` for a list of commands".to_string()),
        other => return Err(format!("unknown command '{other}'; type `help`")),
    };
    Ok(command)
}

fn parse_time(arg: &str, state: &SelectionState) -> Result<SelectionChange, String> {
    if let Ok(index) = arg.parse::<usize>() {
        let n = state.valid_times().len();
        return if index < n {
            Ok(SelectionChange::TimeIndex(index))
        } else {
            Err(format!("time index must be below {n}"))
        };
    }
    state
        .valid_time_by_label(arg)
        .map(SelectionChange::ValidTime)
        .ok_or_else(|| format!("'{arg}' is not one of the valid times; type `axes`"))
}

pub fn print_axes(state: &SelectionState) {
    let levels: Vec<String> = state.levels().iter().map(|l| l.to_string()).collect();
    println!("Pressure levels (hPa): {}", levels.join(", "));
    println!("Valid times (UTC):");
    for (i, t) in state.valid_times().iter().enumerate() {
        println!("  {i:>2}: {}", format_valid_time(*t));
    }
}

pub async fn browse<A: Archive, C: Clock>(pipeline: &mut Pipeline<A, C>) -> anyhow::Result<()> {
    let mut field: Arc<ForecastField> = pipeline.materialize().await?;
    let mut state = SelectionState::new(&field)?;
    println!("{HELP}");
    pipeline.render(&field, &state.current(), None).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line, &state) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        match command {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Axes => print_axes(&state),
            Command::Show => {
                pipeline.render(&field, &state.current(), None).await?;
            }
            Command::Change(change) => {
                let latest = pipeline.materialize().await?;
                if !Arc::ptr_eq(&latest, &field) {
                    let previous = state.current();
                    field = latest;
                    state = SelectionState::near(&field, &previous)?;
                    info!(
                        level = state.current().pressure_level,
                        valid_time = %state.current().valid_time,
                        "A newer model run was downloaded; selectors moved to the nearest options"
                    );
                }
                match state.apply(change)? {
                    Some(selection) => {
                        pipeline.render(&field, &selection, None).await?;
                    }
                    None => println!("Selection unchanged"),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use aerosol_forecast::GridMessage;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::*;

    fn reference_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap()
    }

    fn state() -> SelectionState {
        let mut messages = Vec::new();
        for step in [3, 6, 9] {
            for level in [800.0, 925.0, 1000.0] {
                messages.push(GridMessage {
                    level_hpa: level,
                    reference_time: reference_time(),
                    valid_time: reference_time() + TimeDelta::hours(step),
                    latitudes: vec![30.0, 9.0],
                    longitudes: vec![30.0, 50.0],
                    values: vec![0.0; 4],
                });
            }
        }
        let field = ForecastField::from_messages(messages).unwrap();
        SelectionState::new(&field).unwrap()
    }

    #[test]
    fn test_parse_level_commands() {
        let state = state();
        assert_eq!(
            parse_command("level 925", &state),
            Ok(Command::Change(SelectionChange::Level(925.0)))
        );
        assert_eq!(
            parse_command("  L   850.5 ", &state),
            Ok(Command::Change(SelectionChange::Level(850.5)))
        );
        assert_eq!(
            parse_command("up", &state),
            Ok(Command::Change(SelectionChange::LevelUp))
        );
        assert!(parse_command("level high", &state).is_err());
    }

    #[test]
    fn test_parse_time_commands() {
        let state = state();
        assert_eq!(
            parse_command("time 2", &state),
            Ok(Command::Change(SelectionChange::TimeIndex(2)))
        );
        assert!(parse_command("time 3", &state).is_err());
        assert_eq!(
            parse_command("time 03/09 18:00", &state),
            Ok(Command::Change(SelectionChange::ValidTime(
                reference_time() + TimeDelta::hours(6)
            )))
        );
        assert!(parse_command("time 03/09 19:00", &state).is_err());
        assert_eq!(
            parse_command("next", &state),
            Ok(Command::Change(SelectionChange::NextTime))
        );
    }

    #[test]
    fn test_parse_other_commands() {
        let state = state();
        assert_eq!(parse_command("quit", &state), Ok(Command::Quit));
        assert_eq!(parse_command("Q", &state), Ok(Command::Quit));
        assert_eq!(parse_command("show", &state), Ok(Command::Show));
        assert_eq!(parse_command("axes", &state), Ok(Command::Axes));
        assert_eq!(parse_command("?", &state), Ok(Command::Help));
        assert!(parse_command("", &state).is_err());
        assert!(parse_command("zoom 2", &state).is_err());
    }
}
