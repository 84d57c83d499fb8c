use proptest::prelude::*;
use std::path::Path;

use cold_wallet::tx::HandoffFile;
use cold_wallet::wallet::{accumulate_unspent, HdKeyDeriver, KeyDeriver, Seed, UnspentOutput};
use cold_wallet::{AccountType, ActionType, AddressType, TxType};
use bitcoin::Network;

fn utxo(n: usize, amount: u64) -> UnspentOutput {
    UnspentOutput {
        txid: format!("{:064x}", n),
        vout: 0,
        address: format!("tb1qaddr{}", n),
        account: Some(AccountType::Deposit),
        amount,
        confirmations: 1,
        script_pubkey: String::new(),
        redeem_script: None,
        witness_script: None,
        spendable: true,
    }
}

fn any_action() -> impl Strategy<Value = ActionType> {
    prop_oneof![
        Just(ActionType::Deposit),
        Just(ActionType::Payment),
        Just(ActionType::Transfer),
    ]
}

fn any_tx_type() -> impl Strategy<Value = TxType> {
    prop_oneof![Just(TxType::Unsigned), Just(TxType::Signed)]
}

proptest! {
    #[test]
    fn selection_stops_at_first_prefix_over_target(
        amounts in prop::collection::vec(1u64..50_000_000, 1..20),
        target in 1u64..400_000_000,
    ) {
        let utxos: Vec<UnspentOutput> = amounts.iter().enumerate().map(|(i, a)| utxo(i, *a)).collect();
        let result = accumulate_unspent(&utxos, target);

        let mut running = 0u64;
        let stop = amounts.iter().position(|a| {
            running += a;
            running > target
        });
        match stop {
            Some(k) => {
                prop_assert!(result.is_done);
                prop_assert_eq!(result.selected.len(), k + 1);
                prop_assert_eq!(result.input_total, amounts[..=k].iter().sum::<u64>());
            }
            None => {
                prop_assert!(!result.is_done);
                prop_assert_eq!(result.selected.len(), amounts.len());
            }
        }
        // Order is kept
        for (i, selected) in result.selected.iter().enumerate() {
            prop_assert_eq!(&selected.txid, &utxos[i].txid);
        }
    }

    #[test]
    fn zero_target_takes_everything(amounts in prop::collection::vec(1u64..1_000_000, 0..10)) {
        let utxos: Vec<UnspentOutput> = amounts.iter().enumerate().map(|(i, a)| utxo(i, *a)).collect();
        let result = accumulate_unspent(&utxos, 0);
        prop_assert!(result.is_done);
        prop_assert_eq!(result.selected.len(), amounts.len());
        prop_assert_eq!(result.input_total, amounts.iter().sum::<u64>());
    }

    #[test]
    fn handoff_names_round_trip(
        action in any_action(),
        tx_id in 1i64..1_000_000,
        tx_type in any_tx_type(),
        signed_count in 0u32..16,
        timestamp in 0i64..i64::MAX,
    ) {
        let file = HandoffFile { action, tx_id, tx_type, signed_count, timestamp };
        let path = Path::new("/var/handoff").join(file.file_name());
        prop_assert_eq!(HandoffFile::parse(&path).unwrap(), file);
    }

    #[test]
    fn derivation_is_deterministic(
        seed in prop::collection::vec(any::<u8>(), 16..=64),
        idx_from in 0u32..1_000,
        count in 1u32..4,
    ) {
        let seed = Seed::from_bytes(&seed).unwrap();
        let deriver = HdKeyDeriver::new(AddressType::Bech32, 1, Network::Testnet);
        let first = deriver.derive_keys(&seed, AccountType::Client, idx_from, count).unwrap();
        let second = deriver.derive_keys(&seed, AccountType::Client, idx_from, count).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), count as usize);
        for (offset, key) in first.iter().enumerate() {
            let index = idx_from + offset as u32;
            prop_assert_eq!(key.index, index);
            prop_assert_eq!(&key.path, &format!("m/84'/1'/0'/0/{}", index));
            prop_assert!(key.address.starts_with("tb1q"));
        }
    }
}
