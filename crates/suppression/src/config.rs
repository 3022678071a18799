use capture_common::{
    ConfigError, ConfigMap, Tid,
    consts::TASK_COMM_LEN,
};

/// Initial denylist of the suppression engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuppressionConfig {
    /// Command names whose threads, and their descendants, are suppressed.
    pub comms: Vec<String>,
    /// Threads suppressed from the start.
    pub tids: Vec<Tid>,
}

impl TryFrom<&ConfigMap> for SuppressionConfig {
    type Error = ConfigError;

    fn try_from(config: &ConfigMap) -> Result<Self, Self::Error> {
        let comms: Vec<String> = config.get_list("suppressed_comms")?;
        for comm in &comms {
            if comm.len() >= TASK_COMM_LEN {
                log::warn!(
                    "suppressed command '{comm}' is longer than {} bytes and will never match",
                    TASK_COMM_LEN - 1
                );
            }
        }
        let tids = config
            .get_list::<u64>("suppressed_tids")?
            .into_iter()
            .map(Tid::from_raw)
            .collect();
        Ok(Self { comms, tids })
    }
}
