use chrono::{DateTime, Datelike, Months, Timelike, Utc};

use super::Dialect;

const MAX_PASSES: usize = 8;

/// Portable tokens the core always binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Today,
    Yesterday,
    Tomorrow,
    PastMonth,
    PastYear,
    FollowMonth,
    FollowYear,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    EmptyGuid,
}

#[derive(Debug, Clone)]
enum Body {
    /// Dialect fragment; `<p1>`..`<pN>` mark argument substitution points.
    Literal(String),
    Builtin(Builtin),
}

#[derive(Debug, Clone)]
struct Snippet {
    name: String,
    body: Body,
}

/// Mapping of portable function snippets and `#...#` placeholders to
/// dialect fragments, applied to SQL text until fixpoint.
#[derive(Debug, Clone)]
pub struct SnippetTable {
    dialect: Dialect,
    snippets: Vec<Snippet>,
}

impl SnippetTable {
    pub fn with_builtins(dialect: Dialect) -> Self {
        let mut table = Self {
            dialect,
            snippets: Vec::new(),
        };
        for (name, builtin) in [
            ("TODAY", Builtin::Today),
            ("YESTERDAY", Builtin::Yesterday),
            ("TOMORROW", Builtin::Tomorrow),
            ("PASTMONTH", Builtin::PastMonth),
            ("PASTYEAR", Builtin::PastYear),
            ("FOLLOWMONTH", Builtin::FollowMonth),
            ("FOLLOWYEAR", Builtin::FollowYear),
            ("YEAR", Builtin::Year),
            ("MONTH", Builtin::Month),
            ("DAY", Builtin::Day),
            ("HOUR", Builtin::Hour),
            ("MINUTE", Builtin::Minute),
            ("EMPTYGUID", Builtin::EmptyGuid),
        ] {
            table.snippets.push(Snippet {
                name: name.to_string(),
                body: Body::Builtin(builtin),
            });
        }
        table
    }

    /// Register a custom snippet. Names beginning with `#` are pure
    /// placeholders replaced literally; other names match function-call
    /// occurrences `NAME(...)` whose arguments substitute `<p1>`..`<pN>`
    /// in the replacement.
    pub fn add(&mut self, name: impl Into<String>, replacement: impl Into<String>) {
        self.snippets.push(Snippet {
            name: name.into(),
            body: Body::Literal(replacement.into()),
        });
    }

    pub fn rewrite(&self, sql: &str) -> String {
        self.rewrite_at(sql, Utc::now())
    }

    pub fn rewrite_at(&self, sql: &str, now: DateTime<Utc>) -> String {
        let mut out = sql.to_string();
        for _ in 0..MAX_PASSES {
            let mut changed = false;
            for snippet in &self.snippets {
                if snippet.name.starts_with('#') {
                    let replacement = self.resolve(&snippet.body, now, &[]);
                    let next = out.replace(&snippet.name, &replacement);
                    if next != out {
                        out = next;
                        changed = true;
                    }
                } else {
                    changed |= self.rewrite_calls(&mut out, snippet, now);
                }
            }
            if !changed {
                break;
            }
        }
        out
    }

    /// Replace every `NAME(...)` occurrence of one snippet in a single
    /// left-to-right sweep.
    fn rewrite_calls(&self, out: &mut String, snippet: &Snippet, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        let mut search_from = 0;
        while let Some(call) = find_call(out, &snippet.name, search_from) {
            let args = split_top_level_commas(&out[call.args_start..call.args_end]);
            let arg_refs: Vec<&str> = args.iter().map(|a| a.as_str()).collect();
            let replacement = self.resolve(&snippet.body, now, &arg_refs);
            out.replace_range(call.start..call.end, &replacement);
            search_from = call.start + replacement.len();
            changed = true;
        }
        changed
    }

    fn resolve(&self, body: &Body, now: DateTime<Utc>, args: &[&str]) -> String {
        match body {
            Body::Literal(fragment) => {
                let mut text = fragment.clone();
                for (i, arg) in args.iter().enumerate() {
                    text = text.replace(&format!("<p{}>", i + 1), arg.trim());
                }
                text
            }
            Body::Builtin(builtin) => self.builtin_value(*builtin, now),
        }
    }

    fn builtin_value(&self, builtin: Builtin, now: DateTime<Utc>) -> String {
        let today = now.date_naive();
        let date = |d: chrono::NaiveDate| format!("'{}'", d.format("%Y-%m-%d"));
        match builtin {
            Builtin::Today => date(today),
            Builtin::Yesterday => date(today - chrono::Duration::days(1)),
            Builtin::Tomorrow => date(today + chrono::Duration::days(1)),
            Builtin::PastMonth => date(today.checked_sub_months(Months::new(1)).unwrap_or(today)),
            Builtin::PastYear => date(today.checked_sub_months(Months::new(12)).unwrap_or(today)),
            Builtin::FollowMonth => date(today.checked_add_months(Months::new(1)).unwrap_or(today)),
            Builtin::FollowYear => date(today.checked_add_months(Months::new(12)).unwrap_or(today)),
            Builtin::Year => today.year().to_string(),
            Builtin::Month => today.month().to_string(),
            Builtin::Day => today.day().to_string(),
            Builtin::Hour => now.hour().to_string(),
            Builtin::Minute => now.minute().to_string(),
            Builtin::EmptyGuid => {
                if self.dialect.is_firebird() {
                    "x'00000000000000000000000000000000'".to_string()
                } else {
                    "'00000000-0000-0000-0000-000000000000'".to_string()
                }
            }
        }
    }
}

struct Call {
    start: usize,
    args_start: usize,
    args_end: usize,
    end: usize,
}

/// Locate the next `NAME(` occurrence at a word boundary, outside string
/// literals, and return the balanced-parenthesis extent of the call.
fn find_call(sql: &str, name: &str, from: usize) -> Option<Call> {
    let bytes = sql.as_bytes();
    let mut idx = from;
    while let Some(found) = sql[idx..].find(name) {
        let start = idx + found;
        let end_of_name = start + name.len();

        let boundary_before = start == 0
            || !(bytes[start - 1].is_ascii_alphanumeric() || bytes[start - 1] == b'_' || bytes[start - 1] == b'#');
        let open_follows = bytes.get(end_of_name) == Some(&b'(');

        if boundary_before && open_follows && !inside_string(sql, start) {
            let args_start = end_of_name + 1;
            let args_end = balanced_close(sql, args_start)?;
            return Some(Call {
                start,
                args_start,
                args_end,
                end: args_end + 1,
            });
        }
        idx = end_of_name;
    }
    None
}

fn inside_string(sql: &str, position: usize) -> bool {
    let mut in_string = false;
    for (i, ch) in sql.char_indices() {
        if i >= position {
            break;
        }
        if ch == '\'' {
            in_string = !in_string;
        }
    }
    in_string
}

/// Index of the parenthesis closing the group whose body starts at
/// `from`; respects nesting and single-quoted strings.
fn balanced_close(sql: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (offset, ch) in sql[from..].char_indices() {
        match ch {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                if depth == 0 {
                    return Some(from + offset);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Split an argument list on commas at nesting depth zero.
fn split_top_level_commas(input: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;

    for ch in input.chars() {
        match ch {
            '\'' => {
                in_string = !in_string;
                current.push(ch);
            }
            '(' if !in_string => {
                depth += 1;
                current.push(ch);
            }
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if !in_string && depth == 0 => {
                result.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() || !result.is_empty() {
        result.push(current.trim().to_string());
    }
    result
}
