//! Plain-text page layout for generated documents.
//!
//! Every page carries the company header, the upper-cased document title and
//! a rule; the body follows the layout of the document kind, and the last line
//! of each page is the `Generated on:` footer.

use chrono::{DateTime, Utc};

use super::DocumentRecord;

/// Characters per rendered line.
pub const PAGE_WIDTH: usize = 72;
/// Body lines that fit between the header rule and the footer.
pub const BODY_LINES_PER_PAGE: usize = 26;

const SIGNATURE_LINE: &str = "____________________";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Fields followed by a tick-box list of checklist items.
    Checklist,
    /// Fields followed by receiver and signatory lines.
    SignatureBlock,
    /// Label/value dump.
    Generic,
}

/// Turns `customerName` or `customer_name` into `Customer Name`.
pub fn humanize_key(key: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for ch in key.chars() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if ch.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
            current.push(ch);
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .into_iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn wrap(line: String) -> Vec<String> {
    if line.chars().count() <= PAGE_WIDTH {
        return vec![line];
    }

    let chars: Vec<char> = line.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;
    let mut width = PAGE_WIDTH;
    while start < chars.len() {
        let end = (start + width).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if out.is_empty() {
            out.push(chunk);
        } else {
            out.push(format!("    {}", chunk));
        }
        start = end;
        // continuation lines are indented
        width = PAGE_WIDTH - 4;
    }
    out
}

fn field_lines(record: &DocumentRecord) -> Vec<String> {
    record
        .fields()
        .iter()
        .filter(|(key, value)| key != "id" && !value.trim().is_empty())
        .flat_map(|(key, value)| wrap(format!("{}: {}", humanize_key(key), value)))
        .collect()
}

/// Body lines for a record, before pagination.
pub fn body_lines(layout: Layout, record: &DocumentRecord) -> Vec<String> {
    let mut lines = field_lines(record);

    match layout {
        Layout::Checklist => {
            lines.push(String::new());
            lines.push("Stages".to_string());
            if record.checklist_items().is_empty() {
                lines.push("(no stages selected)".to_string());
            }
            for (index, item) in record.checklist_items().iter().enumerate() {
                lines.extend(wrap(format!("[ ] {}. {}", index + 1, item)));
            }
        }
        Layout::SignatureBlock => {
            for item in record.checklist_items() {
                lines.extend(wrap(format!("- {}", item)));
            }
            lines.push(String::new());
            lines.push(String::new());
            lines.push(format!("{:<36}{}", SIGNATURE_LINE, SIGNATURE_LINE));
            lines.push(format!("{:<36}{}", "Received By", "Authorised Signatory"));
        }
        Layout::Generic => {
            for item in record.checklist_items() {
                lines.extend(wrap(format!("- {}", item)));
            }
        }
    }

    lines
}

/// Splits body lines into pages and frames each with header and footer.
pub fn paginate(
    company_name: &str,
    title: &str,
    body: &[String],
    generated_at: DateTime<Utc>,
) -> Vec<String> {
    let chunks: Vec<&[String]> = if body.is_empty() {
        vec![body]
    } else {
        body.chunks(BODY_LINES_PER_PAGE).collect()
    };
    let total = chunks.len();
    let footer_stamp = generated_at.format("%d/%m/%Y %H:%M:%S UTC");

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let mut page = String::new();
            page.push_str(company_name);
            page.push('\n');
            page.push_str(&title.to_uppercase());
            page.push('\n');
            page.push_str(&"-".repeat(PAGE_WIDTH));
            page.push_str("\n\n");
            for line in chunk {
                page.push_str(line);
                page.push('\n');
            }
            page.push('\n');
            page.push_str(&format!(
                "Generated on: {}    Page {} of {}\n",
                footer_stamp,
                index + 1,
                total
            ));
            page
        })
        .collect()
}
