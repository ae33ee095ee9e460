/// Outcome of one tokenizer pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// A full line was terminated in place.
    Ok,
    /// A stray `\r` or `\n` that cannot end a line.
    Bad,
    /// No terminator yet; wait for more input.
    Open,
}

/// Scans `buf[checked..]` for the end of the current line.
///
/// `buf` must end at the read index. On [`LineStatus::Ok`] both terminator
/// bytes are overwritten with NUL and the returned index points just past
/// them. Otherwise the returned index is where the next pass resumes, so
/// bytes already scanned are never looked at again (a trailing `\r` is the
/// only byte revisited).
pub fn parse_line(buf: &mut [u8], checked: usize) -> (LineStatus, usize) {
    let mut idx = checked;
    while idx < buf.len() {
        match buf[idx] {
            b'\r' => {
                if idx + 1 == buf.len() {
                    return (LineStatus::Open, idx);
                }
                if buf[idx + 1] == b'\n' {
                    buf[idx] = 0;
                    buf[idx + 1] = 0;
                    return (LineStatus::Ok, idx + 2);
                }
                return (LineStatus::Bad, idx);
            }
            b'\n' => {
                if idx > 0 && buf[idx - 1] == b'\r' {
                    buf[idx - 1] = 0;
                    buf[idx] = 0;
                    return (LineStatus::Ok, idx + 1);
                }
                return (LineStatus::Bad, idx);
            }
            _ => idx += 1,
        }
    }

    (LineStatus::Open, idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_terminates_line_in_place() {
        let mut buf = *b"GET / HTTP/1.1\r\nHost";
        let (status, next) = parse_line(&mut buf, 0);
        assert_eq!(status, LineStatus::Ok);
        assert_eq!(next, 16);
        assert_eq!(&buf[14..16], &[0, 0]);
    }

    #[test]
    fn trailing_cr_waits_for_more_input() {
        let mut buf = *b"Host: a\r";
        let (status, next) = parse_line(&mut buf, 0);
        assert_eq!(status, LineStatus::Open);
        assert_eq!(next, 7);
        assert_eq!(buf[7], b'\r');
    }

    #[test]
    fn no_terminator_consumes_scanned_bytes() {
        let mut buf = *b"Host: exa";
        let (status, next) = parse_line(&mut buf, 2);
        assert_eq!(status, LineStatus::Open);
        assert_eq!(next, buf.len());
    }

    #[test]
    fn bare_lf_is_malformed() {
        let mut buf = *b"Host: a\nrest";
        assert_eq!(parse_line(&mut buf, 0).0, LineStatus::Bad);
    }

    #[test]
    fn lf_at_index_zero_is_malformed() {
        let mut buf = *b"\nabc";
        assert_eq!(parse_line(&mut buf, 0).0, LineStatus::Bad);
    }

    #[test]
    fn cr_not_followed_by_lf_is_malformed() {
        let mut buf = *b"Host\rx\r\n";
        assert_eq!(parse_line(&mut buf, 0).0, LineStatus::Bad);
    }

    #[test]
    fn lf_resumed_after_cr_completes_line() {
        let mut buf = *b"ab\r\n";
        let (status, next) = parse_line(&mut buf, 3);
        assert_eq!(status, LineStatus::Ok);
        assert_eq!(next, 4);
        assert_eq!(&buf[2..], &[0, 0]);
    }
}
