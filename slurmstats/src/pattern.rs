/// Expansion of Slurm hostlists, the compressed node-name syntax used in partition definitions.
///
/// Grammar:
///
///  hostlist ::= item ("," item)*
///  item ::= primitive+
///  primitive ::= literal | range
///  literal ::= <character not '[' or ','> +
///  range ::= '[' range-elt ("," range-elt)* ']'
///  range-elt ::= number | number "-" number
///
/// A range is expanded into the numbers it contains, each formatted with at least as many digits
/// as the lower bound was written with, so `n[08-10]` yields n08, n09, n10.  Several ranges in one
/// item multiply out: `r[1-2]n[1-2]` yields r1n1, r1n2, r2n1, r2n2.

use anyhow::{bail, Result};
use std::str::FromStr;

pub fn expand_hostlist(s: &str) -> Result<Vec<String>> {
    let s = s.trim();
    // Slurm prints "(null)" for a partition without nodes.
    if s.is_empty() || s == "(null)" {
        return Ok(vec![]);
    }
    let mut parser = Parser::new(s);
    parser.parse_hostlist()?;
    Ok(parser.result)
}

struct Parser {
    result: Vec<String>,        // Accumulated host names
    ss: Vec<String>,            // Current set of strings for the item
    input: Vec<char>,           // Vector of input characters
    i: usize,                   // Index into input
    lim: usize,                 // Length of input
}

impl Parser {
    fn new(s: &str) -> Parser {
        let input = s.chars().collect::<Vec<char>>();
        let lim = input.len();
        Parser {
            result: vec![],
            ss: vec!["".to_string()],
            input,
            i: 0,
            lim,
        }
    }

    fn parse_hostlist(&mut self) -> Result<()> {
        self.parse_item()?;
        while !self.at_end() {
            self.match_char(',')?;
            self.parse_item()?;
        }
        Ok(())
    }

    // This will not consume the ',' following the item.

    fn parse_item(&mut self) -> Result<()> {
        loop {
            if self.at_end() {
                break;
            }
            match self.peek()? {
                ',' => break,
                '[' => {
                    self.next();
                    let numbers = self.parse_brackets()?; // Consumes ']'
                    self.push_numbers(numbers);
                }
                ']' => bail!("Unbalanced ']'"),
                c => {
                    self.next();
                    self.push_char(c);
                }
            }
        }
        self.consume_nonempty()
    }

    // The '[' has been eaten, and this consumes the ']' but does not look beyond that.

    fn parse_brackets(&mut self) -> Result<Vec<String>> {
        let mut lst = vec![];
        lst.extend(self.parse_range()?);
        while self.peek()? != ']' {
            self.match_char(',')?;
            lst.extend(self.parse_range()?);
        }
        self.match_char(']')?;
        Ok(lst)
    }

    // Consumes either m or m-n, peeks at the next input element.

    fn parse_range(&mut self) -> Result<Vec<String>> {
        let mut result = vec![];
        let (m, width) = self.parse_number()?;
        if self.peek()? == '-' {
            self.next();
            let (n, _) = self.parse_number()?;
            if n < m {
                bail!("Descending range {m}-{n}");
            }
            for i in m..=n {
                result.push(format!("{:0width$}", i));
            }
        } else {
            result.push(format!("{:0width$}", m));
        }
        Ok(result)
    }

    // Consumes digits, errors out on an empty string, peeks at the next input element.  Returns
    // the value and the number of digits it was written with.

    fn parse_number(&mut self) -> Result<(u64, usize)> {
        let start = self.i;
        let mut s = "".to_string();
        while self.i < self.lim && self.input[self.i].is_ascii_digit() {
            s.push(self.input[self.i]);
            self.i += 1;
        }
        if self.i == start {
            bail!("Expected number");
        }
        Ok((u64::from_str(&s)?, s.len()))
    }

    // Result accumulation abstraction.

    fn push_char(&mut self, c: char) {
        for s in &mut self.ss {
            s.push(c);
        }
    }

    fn push_numbers(&mut self, ns: Vec<String>) {
        let mut nvec = vec![];
        for s in &self.ss {
            for n in &ns {
                let mut x = s.clone();
                x += n;
                nvec.push(x);
            }
        }
        self.ss = nvec;
    }

    fn consume_nonempty(&mut self) -> Result<()> {
        if self.ss.len() == 1 && self.ss[0].is_empty() {
            bail!("Empty host name in input")
        }
        self.result.append(&mut self.ss);
        self.ss = vec!["".to_string()];
        Ok(())
    }

    // Input stream abstraction

    fn match_char(&mut self, c: char) -> Result<()> {
        if self.get()? != c {
            bail!("Expected {c}");
        }
        Ok(())
    }

    fn get(&mut self) -> Result<char> {
        let c = self.peek()?;
        self.next();
        Ok(c)
    }

    fn peek(&self) -> Result<char> {
        if self.at_end() {
            bail!("Unexpected end of input")
        }
        Ok(self.input[self.i])
    }

    fn next(&mut self) {
        debug_assert!(!self.at_end());
        self.i += 1;
    }

    fn at_end(&self) -> bool {
        self.i == self.lim
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn strs(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect::<Vec<String>>()
    }

    #[test]
    fn test_expand_hostlist() {
        assert_eq!(
            expand_hostlist("c1-[0-1],c2-[2-3]").unwrap(),
            strs(&["c1-0", "c1-1", "c2-2", "c2-3"])
        );
        assert_eq!(expand_hostlist("c1-0,c2-0").unwrap(), strs(&["c1-0", "c2-0"]));
        assert_eq!(expand_hostlist("c2-1").unwrap(), strs(&["c2-1"]));
        assert_eq!(
            expand_hostlist("c2-[1,3,5]").unwrap(),
            strs(&["c2-1", "c2-3", "c2-5"])
        );
        assert_eq!(
            expand_hostlist("c3-[1-3,5,9-12]").unwrap(),
            strs(&["c3-1", "c3-2", "c3-3", "c3-5", "c3-9", "c3-10", "c3-11", "c3-12"])
        );
        assert_eq!(
            expand_hostlist("c3-[5,9],c5-[15-19]").unwrap(),
            strs(&["c3-5", "c3-9", "c5-15", "c5-16", "c5-17", "c5-18", "c5-19"])
        );
        assert_eq!(
            expand_hostlist("c1-34,c2-[3,21]").unwrap(),
            strs(&["c1-34", "c2-3", "c2-21"])
        );
    }

    #[test]
    fn test_zero_padding() {
        assert_eq!(
            expand_hostlist("node[08-11]").unwrap(),
            strs(&["node08", "node09", "node10", "node11"])
        );
        assert_eq!(
            expand_hostlist("gpu[001-002,010]").unwrap(),
            strs(&["gpu001", "gpu002", "gpu010"])
        );
    }

    #[test]
    fn test_multiple_ranges_and_suffix() {
        assert_eq!(
            expand_hostlist("r[1-2]n[1-2].ib").unwrap(),
            strs(&["r1n1.ib", "r1n2.ib", "r2n1.ib", "r2n2.ib"])
        );
    }

    #[test]
    fn test_empty_lists() {
        assert!(expand_hostlist("").unwrap().is_empty());
        assert!(expand_hostlist("  ").unwrap().is_empty());
        assert!(expand_hostlist("(null)").unwrap().is_empty());
    }

    #[test]
    fn test_malformed() {
        assert!(expand_hostlist("c[1-").is_err());
        assert!(expand_hostlist("c[]").is_err());
        assert!(expand_hostlist("c[3-1]").is_err());
        assert!(expand_hostlist("a,,b").is_err());
        assert!(expand_hostlist("c1]").is_err());
    }
}
