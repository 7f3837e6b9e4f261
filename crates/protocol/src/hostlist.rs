//! Host list expressions such as `tux[01-03,7],login1`.
//!
//! The control plane hands out node lists in this compressed form;
//! transports need the ordered, expanded host names.

use crate::ProtocolError;

/// Refuse to expand expressions naming more hosts than this.
pub const MAX_HOSTS: usize = 65_536;

/// Expands a host list expression into ordered host names.
///
/// Zero padding of the range bounds is preserved (`n[08-10]` gives
/// `n08 n09 n10`). Duplicates are kept in order of appearance.
pub fn expand(expr: &str) -> Result<Vec<String>, ProtocolError> {
    let invalid = |why: &str| ProtocolError::InvalidHostList(format!("{expr}: {why}"));
    let mut hosts = Vec::new();

    for item in split_top_level(expr).map_err(invalid)? {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        let Some(open) = item.find('[') else {
            if item.contains(']') {
                return Err(invalid("unbalanced brackets"));
            }
            hosts.push(item.to_string());
            continue;
        };
        let close = item[open..]
            .find(']')
            .map(|i| open + i)
            .ok_or_else(|| invalid("unbalanced brackets"))?;
        let prefix = &item[..open];
        let suffix = &item[close + 1..];
        if suffix.contains('[') || suffix.contains(']') {
            return Err(invalid("only one bracket group per host is supported"));
        }

        for range in item[open + 1..close].split(',') {
            let range = range.trim();
            let (lo, hi) = match range.split_once('-') {
                Some((lo, hi)) => (lo.trim(), hi.trim()),
                None => (range, range),
            };
            let width = if lo.len() > 1 && lo.starts_with('0') {
                lo.len()
            } else {
                0
            };
            let lo_n: u64 = lo.parse().map_err(|_| invalid("bad range bound"))?;
            let hi_n: u64 = hi.parse().map_err(|_| invalid("bad range bound"))?;
            if lo_n > hi_n {
                return Err(invalid("descending range"));
            }
            if hosts.len() as u64 + (hi_n - lo_n + 1) > MAX_HOSTS as u64 {
                return Err(invalid("too many hosts"));
            }
            for n in lo_n..=hi_n {
                hosts.push(format!("{prefix}{n:0width$}{suffix}"));
            }
        }
    }

    if hosts.len() > MAX_HOSTS {
        return Err(invalid("too many hosts"));
    }
    Ok(hosts)
}

/// Compresses ordered host names back into an expression.
///
/// Only adjacent names with the same prefix and padding are merged, so
/// `expand(&ranged(names))` always returns `names` unchanged.
pub fn ranged(names: &[String]) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut group: Option<Group> = None;

    for name in names {
        let parsed = split_numeric_suffix(name);
        if let (Some(g), Some((prefix, num, width))) = (group.as_mut(), parsed)
            && g.prefix == prefix
            && g.width == width
        {
            match g.ranges.last_mut() {
                Some(last) if last.1 + 1 == num => last.1 = num,
                _ => g.ranges.push((num, num)),
            }
            continue;
        }

        if let Some(g) = group.take() {
            out.push(g.render());
        }
        match parsed {
            Some((prefix, num, width)) => {
                group = Some(Group {
                    prefix: prefix.to_string(),
                    width,
                    ranges: vec![(num, num)],
                });
            }
            None => out.push(name.clone()),
        }
    }
    if let Some(g) = group.take() {
        out.push(g.render());
    }
    out.join(",")
}

struct Group {
    prefix: String,
    width: usize,
    ranges: Vec<(u64, u64)>,
}

impl Group {
    fn render(&self) -> String {
        let width = self.width;
        if let [(lo, hi)] = self.ranges.as_slice()
            && lo == hi
        {
            return format!("{}{lo:0width$}", self.prefix);
        }
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|&(lo, hi)| {
                if lo == hi {
                    format!("{lo:0width$}")
                } else {
                    format!("{lo:0width$}-{hi:0width$}")
                }
            })
            .collect();
        format!("{}[{}]", self.prefix, parts.join(","))
    }
}

/// Splits `name` into prefix, trailing number and zero-padding width.
fn split_numeric_suffix(name: &str) -> Option<(&str, u64, usize)> {
    let digits = name.bytes().rev().take_while(u8::is_ascii_digit).count();
    if digits == 0 || digits > 18 {
        return None;
    }
    let (prefix, num) = name.split_at(name.len() - digits);
    let width = if num.len() > 1 && num.starts_with('0') {
        num.len()
    } else {
        0
    };
    Some((prefix, num.parse().ok()?, width))
}

/// Splits on commas that are not inside brackets.
fn split_top_level(expr: &str) -> Result<Vec<&str>, &'static str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1).ok_or("unbalanced brackets")?,
            ',' if depth == 0 => {
                parts.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unbalanced brackets");
    }
    parts.push(&expr[start..]);
    Ok(parts)
}
