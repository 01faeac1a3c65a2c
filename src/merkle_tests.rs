#[cfg(test)]
mod tests {
    use crate::ethereum::Address;
    use crate::leaf::encode_leaf;
    use crate::merkle::{build, hash_pair, prove_index, verify, MerkleTree};
    use crate::types::Allocation;

    fn allocation(byte: u8, amount: u128) -> Allocation {
        Allocation {
            address: Address::from_bytes([byte; 20]),
            amount,
        }
    }

    fn allocations(n: usize) -> Vec<Allocation> {
        (0..n)
            .map(|i| {
                let mut bytes = [0u8; 20];
                bytes[16..].copy_from_slice(&(i as u32 + 1).to_be_bytes());
                Allocation {
                    address: Address::from_bytes(bytes),
                    amount: (i as u128 + 1) * 1_000,
                }
            })
            .collect()
    }

    #[test]
    fn test_merkle_tree_creation() {
        let leaves = vec![[1u8; 32], [2u8; 32], [3u8; 32], [4u8; 32]];

        let tree = MerkleTree::new(leaves).unwrap();
        assert_ne!(tree.root, [0u8; 32]);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_empty_tree_is_rejected() {
        assert!(MerkleTree::new(vec![]).is_none());
        assert!(build(&[]).is_none());
    }

    #[test]
    fn test_two_leaves_root_is_sorted_pair() {
        let a = [9u8; 32];
        let b = [1u8; 32];
        let tree = MerkleTree::new(vec![a, b]).unwrap();
        let swapped = MerkleTree::new(vec![b, a]).unwrap();
        assert_eq!(tree.root, hash_pair(&b, &a));
        assert_eq!(tree.root, swapped.root);
    }

    #[test]
    fn test_odd_level_duplicates_last_node() {
        let leaves = vec![[1u8; 32], [2u8; 32], [3u8; 32]];
        let tree = MerkleTree::new(leaves).unwrap();

        let left = hash_pair(&[1u8; 32], &[2u8; 32]);
        let right = hash_pair(&[3u8; 32], &[3u8; 32]);
        assert_eq!(tree.root, hash_pair(&left, &right));

        let proof = tree.generate_proof(2).unwrap();
        assert_eq!(proof.siblings[0], [3u8; 32]);
        assert!(tree.verify_proof(&proof));
    }

    #[test]
    fn test_merkle_proof_verification_every_leaf() {
        for n in 1..=17 {
            let built = build(&allocations(n)).unwrap();
            for leaf in &built.leaves {
                let proof = built.tree.generate_proof(leaf.index as usize).unwrap();
                assert!(
                    verify(&leaf.leaf_hash, &proof.siblings, &built.root()),
                    "leaf {} of {} failed",
                    leaf.index,
                    n
                );
            }
        }
    }

    #[test]
    fn test_proof_length_is_ceil_log2() {
        let built = build(&allocations(1000)).unwrap();
        assert_eq!(built.tree.depth(), 10);
        assert_eq!(built.tree.generate_proof(999).unwrap().siblings.len(), 10);
    }

    #[test]
    fn test_single_leaf_has_empty_proof() {
        let built = build(&[allocation(0xaa, 42)]).unwrap();
        let expected = encode_leaf(0, &Address::from_bytes([0xaa; 20]), 42);
        assert_eq!(built.root(), expected);
        assert_eq!(built.leaves[0].leaf_hash, expected);

        let proof = built.tree.generate_proof(0).unwrap();
        assert!(proof.siblings.is_empty());
        assert!(verify(&expected, &proof.siblings, &built.root()));
    }

    #[test]
    fn test_build_is_deterministic() {
        let list = allocations(33);
        let a = build(&list).unwrap();
        let b = build(&list).unwrap();
        assert_eq!(a.root(), b.root());
        assert_eq!(a.leaves, b.leaves);
    }

    #[test]
    fn test_reordering_changes_root() {
        let list = vec![allocation(1, 100), allocation(2, 200), allocation(3, 50)];
        let mut reordered = list.clone();
        reordered.swap(0, 1);
        assert_ne!(build(&list).unwrap().root(), build(&reordered).unwrap().root());
    }

    #[test]
    fn test_merkle_proof_invalid_verification() {
        let tree1 = MerkleTree::new(vec![[1u8; 32], [2u8; 32], [3u8; 32], [4u8; 32]]).unwrap();
        let tree2 = MerkleTree::new(vec![[5u8; 32], [6u8; 32], [7u8; 32], [8u8; 32]]).unwrap();

        let proof = tree1.generate_proof(0).unwrap();

        // Proof belongs to a different tree
        assert!(!tree2.verify_proof(&proof));
    }

    #[test]
    fn test_merkle_proof_with_invalid_index() {
        let tree = MerkleTree::new(vec![[1u8; 32], [2u8; 32], [3u8; 32], [4u8; 32]]).unwrap();
        assert!(tree.generate_proof(999).is_none());
    }

    #[test]
    fn test_flipping_any_proof_bit_fails() {
        let built = build(&allocations(9)).unwrap();
        let proof = built.tree.generate_proof(4).unwrap();

        for i in 0..proof.siblings.len() {
            for bit in [0usize, 7, 128, 255] {
                let mut tampered = proof.siblings.clone();
                tampered[i][bit / 8] ^= 1 << (bit % 8);
                assert!(!verify(&proof.leaf, &tampered, &built.root()));
            }
        }
    }

    #[test]
    fn test_tampered_amount_or_address_fails() {
        let built = build(&allocations(6)).unwrap();
        let leaf = &built.leaves[3];
        let proof = built.tree.generate_proof(3).unwrap();

        let wrong_amount = encode_leaf(leaf.index, &leaf.address, leaf.amount + 1);
        assert!(!verify(&wrong_amount, &proof.siblings, &built.root()));

        let mut other = *leaf.address.as_bytes();
        other[0] ^= 0x01;
        let wrong_address = encode_leaf(leaf.index, &Address::from_bytes(other), leaf.amount);
        assert!(!verify(&wrong_address, &proof.siblings, &built.root()));
    }

    #[test]
    fn test_prove_index_from_stored_leaves() {
        let built = build(&allocations(5)).unwrap();
        let proof = prove_index(&built.leaves, 2).unwrap();
        assert_eq!(proof.root, built.root());
        assert!(verify(&built.leaves[2].leaf_hash, &proof.siblings, &built.root()));

        let mut shuffled = built.leaves.clone();
        shuffled.swap(0, 1);
        assert!(prove_index(&shuffled, 2).is_none());
        assert!(prove_index(&built.leaves, 5).is_none());
    }
}
