use chrono::{Datelike, NaiveDateTime, Timelike};
use thiserror::Error;

pub const NAME_EXTENSION: &str = ".jpg";
const DISALLOWED_CHARS: &[char] = &[':', '*', '?', '<', '>', '|'];
const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];
const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Date(DateField),
    /// `n`: counter that restarts for each calendar day.
    DayCounter,
    /// `N`: counter over the whole sequence.
    GlobalCounter,
}

/// A run of one date specifier letter; the number is the run length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Year(usize),
    Month(usize),
    Day(usize),
    Hour24(usize),
    Hour12(usize),
    Minute(usize),
    Second(usize),
    Fraction(usize),
    AmPm(usize),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("テンプレートが空です")]
    Empty,
    #[error("引用符が閉じられていません")]
    UnterminatedQuote,
    #[error("ファイル名に使えない文字です: {0:?}")]
    InvalidCharacter(char),
    #[error("生成されたパスの要素が不正です: {0:?}")]
    InvalidSegment(String),
    #[error("連番が上限 (4294967295) を超えました。開始番号を小さくしてください")]
    CounterOverflow,
}

pub fn validate_template(input: &str) -> Result<(), TemplateError> {
    parse_template(input).map(|_| ())
}

/// Parses a naming template.
///
/// `n`/`N` are counters, letter runs of `yMdHhmsft` are date fields, text in
/// single or double quotes is literal, everything else (including `\` and `/`,
/// which later act as folder separators) is literal. When the template has no
/// counter, `N` is appended.
pub fn parse_template(input: &str) -> Result<Vec<TemplatePart>, TemplateError> {
    if input.is_empty() {
        return Err(TemplateError::Empty);
    }

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        let part = match ch {
            'n' => TemplatePart::DayCounter,
            'N' => TemplatePart::GlobalCounter,
            'y' | 'M' | 'd' | 'H' | 'h' | 'm' | 's' | 'f' | 't' => {
                let mut run = 1usize;
                while chars.next_if_eq(&ch).is_some() {
                    run += 1;
                }
                TemplatePart::Date(date_field(ch, run))
            }
            '\'' | '"' => {
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == ch {
                        closed = true;
                        break;
                    }
                    check_char(next)?;
                    literal.push(next);
                }
                if !closed {
                    return Err(TemplateError::UnterminatedQuote);
                }
                continue;
            }
            other => {
                check_char(other)?;
                literal.push(other);
                continue;
            }
        };

        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
        }
        parts.push(part);
    }

    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }

    let has_counter = parts
        .iter()
        .any(|p| matches!(p, TemplatePart::DayCounter | TemplatePart::GlobalCounter));
    if !has_counter {
        parts.push(TemplatePart::GlobalCounter);
    }

    Ok(parts)
}

fn date_field(letter: char, run: usize) -> DateField {
    match letter {
        'y' => DateField::Year(run),
        'M' => DateField::Month(run),
        'd' => DateField::Day(run),
        'H' => DateField::Hour24(run),
        'h' => DateField::Hour12(run),
        'm' => DateField::Minute(run),
        's' => DateField::Second(run),
        'f' => DateField::Fraction(run.min(9)),
        _ => DateField::AmPm(run),
    }
}

fn check_char(ch: char) -> Result<(), TemplateError> {
    if DISALLOWED_CHARS.contains(&ch) || ch.is_control() {
        return Err(TemplateError::InvalidCharacter(ch));
    }
    Ok(())
}

/// Renders one file name (with `.jpg`) for `time` and the two counter values.
pub fn render_name(
    parts: &[TemplatePart],
    time: NaiveDateTime,
    day_counter: u32,
    global_counter: u32,
) -> Result<String, TemplateError> {
    let mut output = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(s) => output.push_str(s),
            TemplatePart::Date(field) => output.push_str(&format_field(*field, time)),
            TemplatePart::DayCounter => output.push_str(&format!("{:03}", day_counter)),
            TemplatePart::GlobalCounter => output.push_str(&format!("{:03}", global_counter)),
        }
    }

    if let Some(bad) = output
        .split(['\\', '/'])
        .find(|segment| segment.is_empty() || *segment == "." || *segment == "..")
    {
        return Err(TemplateError::InvalidSegment(bad.to_string()));
    }

    output.push_str(NAME_EXTENSION);
    Ok(output)
}

/// Live preview of the name the first photo would get.
pub fn render_preview_sample(
    template: &str,
    time: NaiveDateTime,
    start_counter: u32,
) -> Result<String, TemplateError> {
    let parts = parse_template(template)?;
    render_name(&parts, time, start_counter, start_counter)
}

fn format_field(field: DateField, t: NaiveDateTime) -> String {
    match field {
        DateField::Year(1) => (t.year() % 100).to_string(),
        DateField::Year(2) => format!("{:02}", t.year().rem_euclid(100)),
        DateField::Year(n) => format!("{:0width$}", t.year(), width = n),
        DateField::Month(1) => t.month().to_string(),
        DateField::Month(2) => format!("{:02}", t.month()),
        DateField::Month(3) => MONTH_NAMES[t.month0() as usize][..3].to_string(),
        DateField::Month(_) => MONTH_NAMES[t.month0() as usize].to_string(),
        DateField::Day(1) => t.day().to_string(),
        DateField::Day(2) => format!("{:02}", t.day()),
        DateField::Day(3) => {
            WEEKDAY_NAMES[t.weekday().num_days_from_monday() as usize][..3].to_string()
        }
        DateField::Day(_) => WEEKDAY_NAMES[t.weekday().num_days_from_monday() as usize].to_string(),
        DateField::Hour24(1) => t.hour().to_string(),
        DateField::Hour24(_) => format!("{:02}", t.hour()),
        DateField::Hour12(n) => {
            let hour = match t.hour() % 12 {
                0 => 12,
                h => h,
            };
            if n == 1 {
                hour.to_string()
            } else {
                format!("{:02}", hour)
            }
        }
        DateField::Minute(1) => t.minute().to_string(),
        DateField::Minute(_) => format!("{:02}", t.minute()),
        DateField::Second(1) => t.second().to_string(),
        DateField::Second(_) => format!("{:02}", t.second()),
        DateField::Fraction(n) => {
            let nanos = t.nanosecond() % 1_000_000_000;
            let scaled = nanos / 10u32.pow(9 - n as u32);
            format!("{:0width$}", scaled, width = n)
        }
        DateField::AmPm(n) => {
            let designator = if t.hour() < 12 { "AM" } else { "PM" };
            if n == 1 {
                designator[..1].to_string()
            } else {
                designator.to_string()
            }
        }
    }
}
