//! Printf-specifier log/snapshot formatting (spec.md §6): the concrete
//! instantiation of the conversion table the spec names only abstractly
//! as `Damson_fprintf`. Width/flag handling beyond precision is out of
//! scope (the table names conversions, not full printf flag semantics);
//! only the conversions it lists are implemented.

/// Formats one log/snapshot record's `values` against its declared
/// `format` string, substituting one value per conversion in order.
/// `%%` is a literal percent and consumes no value.
#[must_use]
pub fn format_log_line(format: &str, values: &[u32]) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut values = values.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = String::from("%");
        let mut conv = None;
        while let Some(&next) = chars.peek() {
            spec.push(next);
            chars.next();
            if next == '%' || next.is_ascii_alphabetic() {
                conv = Some(next);
                break;
            }
        }

        match conv {
            Some('%') => out.push('%'),
            Some(c @ ('d' | 'i' | 'o' | 'x' | 'X' | 'u')) => {
                let v = values.next().copied().unwrap_or(0);
                out.push_str(&format_integer(c, v));
            }
            Some('c') => {
                let v = values.next().copied().unwrap_or(0);
                out.push((v as u8) as char);
            }
            Some('s') => {
                // A pointer value is not meaningful on this channel; emit it raw.
                let v = values.next().copied().unwrap_or(0);
                out.push_str(&format!("{v:#x}"));
            }
            Some('p') => {
                let v = values.next().copied().unwrap_or(0);
                out.push_str(&format!("{v:#x}"));
            }
            Some(c @ ('f' | 'e' | 'E' | 'g' | 'G')) => {
                let v = values.next().copied().unwrap_or(0);
                let fixed_point = f64::from(v as i32) / 65_536.0;
                out.push_str(&format_float(c, fixed_point, &spec));
            }
            _ => out.push_str(&spec),
        }
    }

    out
}

fn format_integer(conv: char, v: u32) -> String {
    match conv {
        'd' | 'i' => format!("{}", v as i32),
        'o' => format!("{v:o}"),
        'x' => format!("{v:x}"),
        'X' => format!("{v:X}"),
        'u' => format!("{v}"),
        _ => unreachable!("format_integer called with non-integer conversion"),
    }
}

fn parse_precision(spec: &str) -> Option<usize> {
    let dot = spec.find('.')?;
    spec[dot + 1..].chars().take_while(char::is_ascii_digit).collect::<String>().parse().ok()
}

fn format_float(conv: char, value: f64, spec: &str) -> String {
    let precision = parse_precision(spec).unwrap_or(6);
    match conv {
        'f' => format!("{value:.precision$}"),
        'e' => format!("{value:.precision$e}"),
        'E' => format!("{value:.precision$E}"),
        'g' | 'G' => {
            let mut s = format!("{value:.precision$}");
            if s.contains('.') {
                while s.ends_with('0') {
                    s.pop();
                }
                if s.ends_with('.') {
                    s.pop();
                }
            }
            if conv == 'G' {
                s.to_uppercase()
            } else {
                s
            }
        }
        _ => unreachable!("format_float called with non-float conversion"),
    }
}
