#[cfg(test)]
mod tests {
    use alloy_primitives::Address;
    use fhe_counter_client::config::{parse_chain_map, SignerConfig};
    use fhe_counter_client::{
        ClientError, Config, ContractRegistry, CounterView, Deployment, GateReason, InstanceStatus,
        StaticRegistry,
    };
    use fhe_counter_lib::{ClearValue, ExposureLabel};
    use std::env;
    use std::io::Write;
    use url::Url;

    const HARDHAT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const HARDHAT_ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.chain_id, 31337);
        assert_eq!(config.network.name, "Hardhat Local");
        assert!(config.mock_chains.contains_key(&31337));
        assert_eq!(config.instance.retry_attempts, 0);
        assert_eq!(config.authorization.valid_duration_seconds, 365 * 24 * 60 * 60);
        assert!(config.authorization.store_path.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.authorization.valid_duration_seconds = 0;
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
        config.authorization.valid_duration_seconds = 60;

        config.signer = Some(SignerConfig {
            private_key: HARDHAT_KEY.to_string(),
            address: Address::repeat_byte(1),
        });
        assert!(config.validate().is_err());

        config.signer = Some(SignerConfig {
            private_key: HARDHAT_KEY.to_string(),
            address: HARDHAT_ACCOUNT.parse().unwrap(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env() {
        env::set_var("CHAIN_ID", "11155111");
        env::set_var("ETHEREUM_RPC_URL", "https://sepolia.example.org");
        env::set_var(
            "FHE_COUNTER_DEPLOYMENTS",
            "11155111=0x5FbDB2315678afecb367f032d93F642f64180aa3, 31337=0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512",
        );
        env::set_var("MOCK_CHAINS", "");
        env::set_var("INSTANCE_RETRY_ATTEMPTS", "2");
        env::set_var("DECRYPTION_VALIDITY_SECONDS", "86400");
        env::set_var("ETHEREUM_WALLET_PRIVATE_KEY", HARDHAT_KEY);

        let config = Config::from_env().expect("environment should parse");

        for name in [
            "CHAIN_ID",
            "ETHEREUM_RPC_URL",
            "FHE_COUNTER_DEPLOYMENTS",
            "MOCK_CHAINS",
            "INSTANCE_RETRY_ATTEMPTS",
            "DECRYPTION_VALIDITY_SECONDS",
            "ETHEREUM_WALLET_PRIVATE_KEY",
        ] {
            env::remove_var(name);
        }

        assert_eq!(config.network.chain_id, 11_155_111);
        assert_eq!(config.network.name, "Sepolia");
        assert_eq!(config.deployments.len(), 2);
        assert!(config.mock_chains.is_empty());
        assert_eq!(config.instance.retry_attempts, 2);
        assert_eq!(config.authorization.valid_duration_seconds, 86_400);
        assert_eq!(
            config.signer.as_ref().map(|s| s.address),
            Some(HARDHAT_ACCOUNT.parse().unwrap())
        );
        assert!(config.validate().is_ok());

        let registry = config.registry().expect("registry should build");
        assert_eq!(
            registry.lookup(11_155_111).map(|d| d.address),
            Some("0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap())
        );
        assert!(registry.lookup(1).is_none());
    }

    #[test]
    fn test_parse_chain_map() {
        let urls = parse_chain_map::<Url>("31337=http://localhost:8545, 1337=http://127.0.0.1:9545").unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[&1337].port(), Some(9545));

        assert!(parse_chain_map::<Url>("").unwrap().is_empty());
        assert!(parse_chain_map::<Url>("31337").is_err());
        assert!(parse_chain_map::<Address>("abc=0x00").is_err());
    }

    #[test]
    fn test_registry_merges_file_and_inline_deployments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "31337": {{ "address": "0x5FbDB2315678afecb367f032d93F642f64180aa3", "chainId": 31337 }} }}"#
        )
        .unwrap();

        let inline = Address::repeat_byte(0x77);
        let config = Config {
            deployments_file: Some(file.path().to_path_buf()),
            deployments: vec![Deployment {
                chain_id: 31337,
                address: inline,
                chain_name: None,
            }],
            ..Config::default()
        };

        let registry: StaticRegistry = config.registry().unwrap();
        assert_eq!(registry.lookup(31337).map(|d| d.address), Some(inline));
    }

    #[test]
    fn test_view_serialization() {
        let view = CounterView {
            chain_id: Some(31337),
            instance_status: InstanceStatus::Ready,
            clear: Some(ClearValue::new(-3)),
            is_decrypted: true,
            ..CounterView::default()
        };

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["chainId"], 31337);
        assert_eq!(json["instanceStatus"], "ready");
        assert_eq!(json["isDecrypted"], true);
        assert_eq!(json["clear"], -3);
        assert_eq!(view.exposure(), ExposureLabel::NetShort);
        assert_eq!(view.exposure().to_string(), "Net Short");
    }

    #[test]
    fn test_gate_reason_display() {
        assert_eq!(GateReason::Busy.to_string(), "operation already in progress");
        assert_eq!(
            GateReason::NotDeployed.to_string(),
            "contract not deployed on this chain"
        );
    }
}
