use crate::token::TokenKind;

/// A bit-set of `TokenKind`s.
#[derive(Clone, Copy)]
pub(crate) struct TokenSet(u64);

impl TokenSet {
    pub(crate) const fn new(kinds: &[TokenKind]) -> TokenSet {
        let mut res = 0u64;
        let mut i = 0;
        while i < kinds.len() {
            res |= mask(kinds[i]);
            i += 1;
        }
        TokenSet(res)
    }

    pub(crate) const fn union(self, other: TokenSet) -> TokenSet {
        TokenSet(self.0 | other.0)
    }

    pub(crate) const fn contains(self, kind: TokenKind) -> bool {
        self.0 & mask(kind) != 0
    }
}

const fn mask(kind: TokenKind) -> u64 {
    1u64 << (kind as usize)
}

#[test]
fn token_set_membership() {
    use crate::token::TokenKind::*;
    let ts = TokenSet::new(&[Func, Return]).union(TokenSet::new(&[RBrace]));
    assert!(ts.contains(Func));
    assert!(ts.contains(Return));
    assert!(ts.contains(RBrace));
    assert!(!ts.contains(Plus));
}
