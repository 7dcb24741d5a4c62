//! Cleanup for narrative text coming back from analysis providers.

/// Rejoins hard-wrapped lines into paragraphs while keeping bullet items on
/// their own lines. Paragraphs are separated by a single blank line.
pub fn normalize_text_block(text: &str) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            flush(&mut paragraph, &mut blocks);
            if blocks.last().is_some_and(|b| !b.is_empty()) {
                blocks.push(String::new());
            }
            continue;
        }
        if is_bullet(line) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(line.to_string());
        } else {
            paragraph.push(line);
        }
    }
    flush(&mut paragraph, &mut blocks);

    while blocks.last().is_some_and(|b| b.is_empty()) {
        blocks.pop();
    }

    blocks
        .iter()
        .map(|b| tidy_spacing(b))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Non-empty lines of the normalized block.
pub fn rationale_lines(text: &str) -> Vec<String> {
    normalize_text_block(text)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn flush(paragraph: &mut Vec<&str>, blocks: &mut Vec<String>) {
    if !paragraph.is_empty() {
        blocks.push(paragraph.join(" "));
        paragraph.clear();
    }
}

fn is_bullet(line: &str) -> bool {
    if line.starts_with("- ") || line.starts_with("* ") || line.starts_with("+ ") {
        return true;
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && line[digits..].starts_with(". ")
}

/// Collapses whitespace runs and drops spaces before punctuation.
fn tidy_spacing(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for word in line.split_whitespace() {
        let starts_with_punct = word
            .chars()
            .next()
            .is_some_and(|c| matches!(c, ',' | '.' | ';' | ':' | '%' | '!' | '?'));
        if !out.is_empty() && !starts_with_punct {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
