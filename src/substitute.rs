use crate::executor::Captures;

impl Captures {
    /// Expand a replacement template against this match of `subject`.
    ///
    /// `&` and `\0` stand for the whole match and `\1`..`\9` for groups; a
    /// group that did not take part expands to nothing. `\\` and `\&` give
    /// the literal byte, any other byte is copied as is.
    pub fn expand(&self, subject: &[u8], template: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(template.len());
        let mut i = 0;
        while i < template.len() {
            let c = template[i];
            i += 1;
            match (c, template.get(i).copied()) {
                (b'&', _) => self.append(0, subject, &mut out),
                (b'\\', Some(d @ b'0'..=b'9')) => {
                    i += 1;
                    self.append((d - b'0') as usize, subject, &mut out);
                }
                (b'\\', Some(e @ (b'\\' | b'&'))) => {
                    i += 1;
                    out.push(e);
                }
                (c, _) => out.push(c),
            }
        }
        out
    }

    fn append(&self, group: usize, subject: &[u8], out: &mut Vec<u8>) {
        if let Some((b, e)) = self.get(group) {
            if let Some(text) = subject.get(b..e) {
                out.extend_from_slice(text);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::Regex;
    use pretty_assertions::assert_eq;

    fn expand(pattern: &str, subject: &str, template: &str) -> String {
        let re = Regex::new(pattern).expect("should be valid");
        let caps = re.captures(subject.as_bytes()).expect("should match");
        String::from_utf8(caps.expand(subject.as_bytes(), template.as_bytes())).unwrap()
    }

    #[test]
    fn templates() {
        assert_eq!("[b]", expand("b", "abc", "[&]"));
        assert_eq!("20-10", expand("(\\d+)-(\\d+)", "10-20", "\\2-\\1"));
        assert_eq!("10-20", expand("(\\d+)-(\\d+)", "10-20", "\\0"));
        assert_eq!("&\\", expand("x", "x", "\\&\\\\"));
        assert_eq!("\\n!", expand("x", "x", "\\n!"));
        assert_eq!("<>", expand("(a)|b", "b", "<\\1>"));
        assert_eq!("<>", expand("a", "a", "<\\5>"));
        assert_eq!("end\\", expand("a", "a", "end\\"));
    }
}
