use crate::domain::errors::SynthesisError;

const SOURCE_TAGS: [&str; 4] = ["", "python", "py", "python3"];
const DANGLING_ENDINGS: [&str; 11] = [",", "\\", "(", "[", "{", "=", "+", "-", "/", " and", " or"];

struct Fence<'a> {
    tag: &'a str,
    body: Vec<&'a str>,
}

/// Pulls exactly one complete source block out of a completion.
///
/// Fenced blocks are preferred (a python-tagged or untagged one first);
/// without fences the whole completion is taken as source. The result must
/// be non-empty, have closed fences and balanced delimiters, and must not end
/// mid-statement.
pub fn extract_source(completion: &str) -> Result<String, SynthesisError> {
    let source = match fenced_blocks(completion)? {
        blocks if blocks.is_empty() => completion.trim().to_string(),
        blocks => {
            let chosen = blocks
                .iter()
                .find(|b| SOURCE_TAGS.contains(&b.tag))
                .unwrap_or(&blocks[0]);
            chosen.body.join("\n")
        }
    };

    if source.trim().is_empty() {
        return Err(SynthesisError::EmptySource);
    }
    check_delimiters(&source)?;
    check_not_truncated(&source)?;
    Ok(source.trim_end().to_string() + "\n")
}

fn fenced_blocks(completion: &str) -> Result<Vec<Fence<'_>>, SynthesisError> {
    let mut blocks = Vec::new();
    let mut open: Option<(usize, Fence<'_>)> = None;

    for (idx, line) in completion.lines().enumerate() {
        let trimmed = line.trim();
        if let Some(tag) = trimmed.strip_prefix("```") {
            match open.take() {
                Some((_, fence)) => blocks.push(fence),
                None => {
                    open = Some((
                        idx + 1,
                        Fence {
                            tag: tag.trim(),
                            body: Vec::new(),
                        },
                    ))
                }
            }
            continue;
        }
        if let Some((_, fence)) = open.as_mut() {
            fence.body.push(line);
        }
    }

    if let Some((line, _)) = open {
        return Err(SynthesisError::UnterminatedFence { line });
    }
    Ok(blocks)
}

fn check_delimiters(source: &str) -> Result<(), SynthesisError> {
    let mut stack: Vec<char> = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    let mut quote: Option<(char, bool)> = None;

    while i < chars.len() {
        let ch = chars[i];
        let triple = |at: usize, q: char| at + 2 < chars.len() && chars[at + 1] == q && chars[at + 2] == q;

        if let Some((q, is_triple)) = quote {
            if ch == '\\' {
                i += 2;
                continue;
            }
            if ch == q && (!is_triple || triple(i, q)) {
                quote = None;
                i += if is_triple { 3 } else { 1 };
                continue;
            }
            // A single-quoted string never spans lines
            if ch == '\n' && !is_triple {
                quote = None;
            }
            i += 1;
            continue;
        }

        match ch {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '"' | '\'' => {
                let is_triple = triple(i, ch);
                quote = Some((ch, is_triple));
                i += if is_triple { 3 } else { 1 };
                continue;
            }
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Err(SynthesisError::UnbalancedDelimiter { delimiter: ch });
                }
            }
            _ => {}
        }
        i += 1;
    }

    if let Some((q, _)) = quote {
        return Err(SynthesisError::UnbalancedDelimiter { delimiter: q });
    }
    match stack.pop() {
        Some(open) => Err(SynthesisError::UnbalancedDelimiter { delimiter: open }),
        None => Ok(()),
    }
}

fn check_not_truncated(source: &str) -> Result<(), SynthesisError> {
    let Some(last) = source
        .lines()
        .map(str::trim_end)
        .rfind(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
    else {
        return Ok(());
    };

    let code = last.trim();
    if code.ends_with(':') || DANGLING_ENDINGS.iter().any(|e| code.ends_with(e)) {
        return Err(SynthesisError::Truncated {
            last_line: code.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_python_block() {
        let completion = "Plan:\n```text\nnot code\n```\nCode:\n```python\nprint('hi')\n```\n";
        assert_eq!(extract_source(completion).unwrap(), "print('hi')\n");
    }

    #[test]
    fn test_unfenced_completion_is_source() {
        assert_eq!(extract_source("x = 1\nprint(x)\n").unwrap(), "x = 1\nprint(x)\n");
    }

    #[test]
    fn test_unterminated_fence() {
        let err = extract_source("Here:\n```python\nx = 1\n").unwrap_err();
        assert_eq!(err, SynthesisError::UnterminatedFence { line: 2 });
    }

    #[test]
    fn test_unbalanced_delimiters() {
        let err = extract_source("```python\nprint((1)\n```").unwrap_err();
        assert_eq!(err, SynthesisError::UnbalancedDelimiter { delimiter: '(' });
        // Brackets inside strings and comments do not count
        assert!(extract_source("s = ')]}'  # (((\nprint(s)\n").is_ok());
        assert!(extract_source("doc = \"\"\"\n(unclosed\n\"\"\"\nprint(doc)\n").is_ok());
    }

    #[test]
    fn test_truncated_last_line() {
        let err = extract_source("def next(self):\n    if x > 1:\n").unwrap_err();
        assert!(matches!(err, SynthesisError::Truncated { .. }));
        let err = extract_source("total = a +\n").unwrap_err();
        assert_eq!(
            err,
            SynthesisError::Truncated {
                last_line: "total = a +".to_string()
            }
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(extract_source("```python\n```").unwrap_err(), SynthesisError::EmptySource);
        assert_eq!(extract_source("   ").unwrap_err(), SynthesisError::EmptySource);
    }
}
