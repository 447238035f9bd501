//! Character data normalisation.

/// Normalise a run of character data: line breaks become spaces, tabs are
/// stripped, and runs of four or more spaces between two non-space characters
/// collapse to one space. Leading and trailing runs are kept.
pub fn normalize(raw: &str) -> String {
    let flattened: Vec<char> = raw
        .chars()
        .filter(|c| *c != '\t')
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    let mut out = String::with_capacity(flattened.len());
    let mut i = 0;
    while i < flattened.len() {
        if flattened[i] != ' ' {
            out.push(flattened[i]);
            i += 1;
            continue;
        }
        let start = i;
        while i < flattened.len() && flattened[i] == ' ' {
            i += 1;
        }
        let run = i - start;
        let inner = start > 0 && i < flattened.len();
        if inner && run >= 4 {
            out.push(' ');
        } else {
            out.extend(std::iter::repeat(' ').take(run));
        }
    }
    out
}

/// Whitespace that only formats the source (indentation between elements).
pub fn is_layout_whitespace(raw: &str) -> bool {
    raw.chars().all(char::is_whitespace) && raw.contains(['\n', '\r'])
}
