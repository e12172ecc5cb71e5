/// How a single line of a multi-valued input is split into items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Every line is one item. Commas are part of the value.
    Lines,
    /// Every line holds comma separated items, where an item wrapped in double quotes may contain
    /// commas itself.
    Csv,
}

/// Splits a multi-valued input into its items. Items are trimmed, empty items are dropped.
pub fn parse_list(input: &str, mode: ListMode) -> Vec<String> {
    let mut out = Vec::new();
    for line in input.lines() {
        match mode {
            ListMode::Lines => push_item(&mut out, line),
            ListMode::Csv => {
                for field in CsvFields::new(line) {
                    push_item(&mut out, &field);
                }
            }
        }
    }
    out
}

fn push_item(out: &mut Vec<String>, item: &str) {
    let item = item.trim();
    if !item.is_empty() {
        out.push(item.to_owned());
    }
}

/// Iterates over the comma separated fields of a single line. A field is quoted only when it
/// starts with `"`; inside quotes, `""` stands for a literal quote. Quotes appearing in the middle
/// of an unquoted field are kept as is.
struct CsvFields<'a> {
    rest: Option<&'a str>,
}

impl<'a> CsvFields<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: Some(line) }
    }
}

impl Iterator for CsvFields<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest.take()?;
        let trimmed = rest.trim_start();

        let Some(quoted) = trimmed.strip_prefix('"') else {
            return Some(match rest.split_once(',') {
                Some((field, tail)) => {
                    self.rest = Some(tail);
                    field.to_owned()
                }
                None => rest.to_owned(),
            });
        };

        let mut field = String::new();
        let mut chars = quoted.char_indices().peekable();
        let mut tail = "";
        while let Some((index, c)) = chars.next() {
            if c != '"' {
                field.push(c);
                continue;
            }
            if let Some((_, '"')) = chars.peek() {
                chars.next();
                field.push('"');
                continue;
            }
            tail = &quoted[index + 1..];
            break;
        }

        // Anything between the closing quote and the next comma belongs to the same field.
        match tail.split_once(',') {
            Some((extra, next)) => {
                field.push_str(extra);
                self.rest = Some(next);
            }
            None => field.push_str(tail),
        }

        Some(field)
    }
}
