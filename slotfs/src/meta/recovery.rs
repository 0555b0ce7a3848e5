use crate::meta::meta_block::MetaBlock;

pub fn most_recent(copies: &[Option<MetaBlock>; 2]) -> Option<usize> {
    match copies {
        [None, None] => None,
        [Some(_), None] => Some(0),
        [None, Some(_)] => Some(1),
        [Some(a), Some(b)] => {
            // a gap above one only comes from the 8-bit counter wrapping
            let gap = (i16::from(a.revision) - i16::from(b.revision)).abs();
            let a_is_newer = if gap > 1 {
                a.revision < b.revision
            } else {
                a.revision >= b.revision
            };
            Some(if a_is_newer { 0 } else { 1 })
        }
    }
}

pub fn stale_index(most_recent: usize) -> usize {
    (most_recent + 1) % 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(revision: u8) -> Option<MetaBlock> {
        Some(MetaBlock {
            revision,
            ..MetaBlock::default()
        })
    }

    #[test]
    fn consecutive_revision() {
        assert_eq!(most_recent(&[rev(10), rev(11)]), Some(1));
        assert_eq!(most_recent(&[rev(11), rev(10)]), Some(0));
        assert_eq!(most_recent(&[rev(10), None]), Some(0));
        assert_eq!(most_recent(&[None, rev(11)]), Some(1));
        assert_eq!(most_recent(&[None, None]), None);
    }

    #[test]
    fn overflowed_revision() {
        assert_eq!(most_recent(&[rev(10), rev(2)]), Some(1));
        assert_eq!(most_recent(&[rev(255), rev(1)]), Some(1));
        assert_eq!(most_recent(&[rev(1), rev(255)]), Some(0));
    }

    #[test]
    fn equal_revisions_pick_a() {
        assert_eq!(most_recent(&[rev(0), rev(0)]), Some(0));
        assert_eq!(most_recent(&[rev(1), rev(1)]), Some(0));
    }

    #[test]
    fn commits_alternate_copies() {
        let mut copies = [rev(1), rev(1)];
        let mut md = MetaBlock::created(0, 512);
        let mut targets = Vec::new();
        for _ in 0..600 {
            md.revision = md.next_revision();
            let idx = stale_index(most_recent(&copies).unwrap());
            copies[idx] = Some(md);
            targets.push(idx);
            assert_eq!(most_recent(&copies), Some(idx));
        }
        assert_eq!(&targets[..4], &[1, 0, 1, 0]);
    }
}
