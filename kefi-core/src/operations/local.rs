use super::OperationOptions;

pub fn uppercase(text: &str, _options: &OperationOptions) -> Result<String, String> {
    Ok(text.to_uppercase())
}

pub fn lowercase(text: &str, _options: &OperationOptions) -> Result<String, String> {
    Ok(text.to_lowercase())
}

pub fn title_case(text: &str, _options: &OperationOptions) -> Result<String, String> {
    let mut output = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_whitespace() {
            at_word_start = true;
            output.push(ch);
        } else if at_word_start {
            at_word_start = false;
            output.extend(ch.to_uppercase());
        } else {
            output.extend(ch.to_lowercase());
        }
    }
    Ok(output)
}

pub fn sentence_case(text: &str, _options: &OperationOptions) -> Result<String, String> {
    let mut output = String::with_capacity(text.len());
    let mut capitalize_next = true;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if capitalize_next {
                output.extend(ch.to_uppercase());
                capitalize_next = false;
            } else {
                output.extend(ch.to_lowercase());
            }
            continue;
        }

        if matches!(ch, '.' | '!' | '?') {
            capitalize_next = true;
        } else if !ch.is_whitespace() && !is_closing_mark(ch) {
            capitalize_next = false;
        }
        output.push(ch);
    }
    Ok(output)
}

/// Collapses runs of spaces and tabs, strips trailing whitespace from each
/// line, keeps at most one blank line between paragraphs, and trims the
/// whole result.
pub fn normalize_whitespace(text: &str, _options: &OperationOptions) -> Result<String, String> {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0_usize;

    for raw_line in text.lines() {
        let collapsed = collapse_inline_whitespace(raw_line);
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(collapsed);
    }

    Ok(lines.join("\n").trim().to_string())
}

fn collapse_inline_whitespace(line: &str) -> String {
    let mut collapsed = String::with_capacity(line.len());
    let mut previous_was_space = false;
    for ch in line.trim_end().chars() {
        if ch == ' ' || ch == '\t' {
            if !previous_was_space {
                collapsed.push(' ');
            }
            previous_was_space = true;
        } else {
            collapsed.push(ch);
            previous_was_space = false;
        }
    }
    collapsed
}

fn is_closing_mark(ch: char) -> bool {
    matches!(ch, '"' | '\'' | '”' | '’' | ')' | ']' | '}')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(transform: super::super::LocalTransform, text: &str) -> String {
        match transform(text, &OperationOptions::default()) {
            Ok(value) => value,
            Err(err) => panic!("transform failed: {err}"),
        }
    }

    #[test]
    fn case_conversions() {
        assert_eq!(run(uppercase, "bcd"), "BCD");
        assert_eq!(run(lowercase, "MiXeD Ünïcode"), "mixed ünïcode");
    }

    #[test]
    fn title_case_preserves_whitespace() {
        assert_eq!(run(title_case, "the QUICK\tbrown  fox"), "The Quick\tBrown  Fox");
    }

    #[test]
    fn sentence_case_capitalizes_after_terminators() {
        assert_eq!(
            run(sentence_case, "HELLO THERE. how are you? (fine!) ok"),
            "Hello there. How are you? (fine!) Ok"
        );
    }

    #[test]
    fn normalize_whitespace_collapses_runs_and_blank_lines() {
        let input = "  first   line  \t\n\n\n\nsecond\t\tline   \n";
        assert_eq!(run(normalize_whitespace, input), "first line\n\nsecond line");
    }
}
