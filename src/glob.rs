/// Redis-style glob matching over raw bytes, used by `MATCH` and `KEYS`.
///
/// Supports `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes. Keys and
/// members are binary-safe, so nothing here assumes UTF-8.
pub fn glob_match(pattern: &[u8], subject: &[u8]) -> bool {
    let mut p = 0;
    let mut s = 0;
    // Position to resume from after the most recent `*`: (pattern, subject).
    let mut backtrack: Option<(usize, usize)> = None;

    while s < subject.len() {
        if let Some(step) = match_one(pattern, p, subject[s]) {
            match step {
                Step::Star => {
                    backtrack = Some((p + 1, s));
                    p += 1;
                    continue;
                }
                Step::Consumed(next) => {
                    p = next;
                    s += 1;
                    continue;
                }
            }
        }

        match backtrack {
            Some((bp, bs)) => {
                p = bp;
                s = bs + 1;
                backtrack = Some((bp, bs + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

enum Step {
    Star,
    Consumed(usize),
}

/// Try to match the pattern token at `p` against `ch`.
fn match_one(pattern: &[u8], p: usize, ch: u8) -> Option<Step> {
    let token = *pattern.get(p)?;
    match token {
        b'*' => Some(Step::Star),
        b'?' => Some(Step::Consumed(p + 1)),
        b'[' => {
            let (matched, next) = match_class(pattern, p + 1, ch)?;
            matched.then_some(Step::Consumed(next))
        }
        b'\\' if p + 1 < pattern.len() => {
            (pattern[p + 1] == ch).then_some(Step::Consumed(p + 2))
        }
        c => (c == ch).then_some(Step::Consumed(p + 1)),
    }
}

/// Match a character class whose body starts at `start` (just past `[`).
/// Returns whether `ch` is in the class and the index just past `]`.
/// An unterminated class never matches.
fn match_class(pattern: &[u8], start: usize, ch: u8) -> Option<(bool, usize)> {
    let mut i = start;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    loop {
        let c = *pattern.get(i)?;
        if c == b']' {
            break;
        }
        if c == b'\\' && i + 1 < pattern.len() {
            matched |= pattern[i + 1] == ch;
            i += 2;
        } else if pattern.get(i + 1) == Some(&b'-') && pattern.get(i + 2).is_some_and(|&h| h != b']') {
            let (mut lo, mut hi) = (c, pattern[i + 2]);
            if lo > hi {
                std::mem::swap(&mut lo, &mut hi);
            }
            matched |= (lo..=hi).contains(&ch);
            i += 3;
        } else {
            matched |= c == ch;
            i += 1;
        }
    }

    Some((matched != negate, i + 1))
}
