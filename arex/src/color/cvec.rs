//! Character-set accumulator used while parsing bracket expressions.

/// A set of characters, kept as explicit chrs plus inclusive ranges.
/// Parsing code fills one of these per bracket item and then turns it into
/// colored arcs.
#[derive(Clone, Debug, Default)]
pub(crate) struct Cvec {
    pub chrs: Vec<char>,
    pub ranges: Vec<(char, char)>,
}

impl Cvec {
    pub fn with_capacity(nchrs: usize, nranges: usize) -> Cvec {
        Cvec {
            chrs: Vec::with_capacity(nchrs),
            ranges: Vec::with_capacity(nranges),
        }
    }

    pub fn clear(&mut self) {
        self.chrs.clear();
        self.ranges.clear();
    }

    pub fn add_chr(&mut self, c: char) {
        self.chrs.push(c);
    }

    pub fn add_range(&mut self, from: char, to: char) {
        self.ranges.push((from, to));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate() {
        let mut cv = Cvec::with_capacity(4, 2);
        cv.add_chr('a');
        cv.add_range('0', '9');
        assert_eq!(cv.chrs, vec!['a']);
        assert_eq!(cv.ranges, vec![('0', '9')]);
        cv.clear();
        assert!(cv.chrs.is_empty() && cv.ranges.is_empty());
    }
}
