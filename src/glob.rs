use regex::Regex;

///
/// Translates a URL glob into an anchored regular expression source.
///
/// `*` matches any sequence (slashes included), `?` a single character,
/// `[...]` a character class and `{a,b}` one of the listed alternatives.
/// Everything else is matched literally.
///
pub(crate) fn to_regex_source(glob: &str) -> String {
    let mut source = String::with_capacity(glob.len() + 8);
    let mut in_group = false;
    let mut in_class = false;
    let mut class_start = false;
    let mut literal = [0u8; 4];

    source.push('^');

    for c in glob.chars() {
        if in_class {
            if class_start {
                class_start = false;
                if c == '!' {
                    source.push('^');
                    continue;
                }
            }

            match c {
                ']' => {
                    in_class = false;
                    source.push(']');
                }
                '\\' | '[' => {
                    source.push('\\');
                    source.push(c);
                }
                _ => source.push(c),
            }
            continue;
        }

        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            '[' => {
                in_class = true;
                class_start = true;
                source.push('[');
            }
            '{' => {
                in_group = true;
                source.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                source.push(')');
            }
            ',' if in_group => source.push('|'),
            _ => source.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }

    // unterminated classes and groups are taken literally
    if in_class || in_group {
        let escaped = regex::escape(glob);
        return format!("^{}$", escaped);
    }

    source.push('$');
    source
}

pub(crate) fn compile(glob: &str) -> Regex {
    // the source is built from escaped literals and balanced constructs only
    Regex::new(&to_regex_source(glob))
        .unwrap_or_else(|_| Regex::new(&format!("^{}$", regex::escape(glob))).unwrap())
}
