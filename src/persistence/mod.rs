//! Snapshots of assembled MDPs and of learning runs.
//!
//! A missing snapshot file is a cold start and loads as `Ok(None)`.

use crate::error::{Error, Result};
use crate::mdp::{Mdp, MdpParts};
use crate::ml::{LearningParameters, QEntry, QTable};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::hash::Hash;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::persistence(parent, e))?;
    }
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| Error::persistence(path, e))
}

fn open(path: &Path) -> Result<Option<BufReader<File>>> {
    match File::open(path) {
        Ok(file) => Ok(Some(BufReader::new(file))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::persistence(path, e)),
    }
}

pub fn save_mdp<S, A, R>(mdp: &Mdp<S, A, R>, path: impl AsRef<Path>) -> Result<()>
where
    S: Serialize,
    A: Serialize,
    R: Serialize,
{
    let path = path.as_ref();
    let mut writer = create(path)?;
    bincode::serialize_into(&mut writer, &mdp.as_parts())?;
    writer.flush().map_err(|e| Error::persistence(path, e))?;
    tracing::info!("Saved MDP with {} states to {}", mdp.len(), path.display());
    Ok(())
}

pub fn load_mdp<S, A, R>(path: impl AsRef<Path>) -> Result<Option<Mdp<S, A, R>>>
where
    S: DeserializeOwned + Clone + Eq + Hash,
    A: DeserializeOwned,
    R: DeserializeOwned,
{
    let path = path.as_ref();
    let Some(reader) = open(path)? else {
        tracing::info!("No MDP snapshot at {}", path.display());
        return Ok(None);
    };
    let parts: MdpParts<S, A, R> = bincode::deserialize_from(reader)?;
    let mdp = Mdp::from_parts(parts)?;
    tracing::info!("Loaded MDP with {} states from {}", mdp.len(), path.display());
    Ok(Some(mdp))
}

/// Everything worth keeping from one learning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullRun<A> {
    pub parameters: LearningParameters,
    /// `(episode, summed reward)`
    pub rewards: Vec<(usize, f64)>,
    pub policy: Vec<A>,
    pub policy_reward: Option<f64>,
    /// Present only when the parameters asked for it
    pub q: Option<Vec<QEntry>>,
}

impl<A> FullRun<A> {
    pub fn q_table(&self) -> Option<QTable> {
        self.q.as_deref().map(QTable::from_entries)
    }
}

impl<A: Serialize> FullRun<A> {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = create(path)?;
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(|e| Error::persistence(path, e))?;
        tracing::info!("Saved learning run to {}", path.display());
        Ok(())
    }
}

impl<A: DeserializeOwned> FullRun<A> {
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        match open(path.as_ref())? {
            Some(reader) => Ok(Some(serde_json::from_reader(reader)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdp::{MdpBuilder, StateId, StateReward};
    use std::path::PathBuf;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Fixed(f64);

    impl StateReward<String> for Fixed {
        fn reward(&self, _: Option<&String>, _: Option<&Self>) -> f64 {
            self.0
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("akmdp-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_missing_snapshots_are_cold_starts() {
        let path = temp_path("does-not-exist.bin");
        let mdp: Option<Mdp<u32, String, Fixed>> = load_mdp(&path).unwrap();
        assert!(mdp.is_none());
        assert!(FullRun::<String>::load(temp_path("does-not-exist.json")).unwrap().is_none());
    }

    #[test]
    fn test_mdp_snapshot_round_trip() {
        let mut builder = MdpBuilder::new();
        let a = builder.add_state(10u32, Fixed(0.0));
        let b = builder.add_state(20u32, Fixed(2.5));
        builder.add_transition(a, "go".to_string(), b).unwrap();
        builder.mark_terminal(b);
        let mdp = builder.build(a).unwrap();

        let path = temp_path("mdp.bin");
        save_mdp(&mdp, &path).unwrap();
        let loaded: Mdp<u32, String, Fixed> = load_mdp(&path).unwrap().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, mdp);
        assert_eq!(loaded.id_of(&20), Some(StateId(1)));
    }

    #[test]
    fn test_full_run_round_trip() {
        let mut q = QTable::default();
        q.set(StateId(0), Some(1), 0.1 + 0.2);
        q.set(StateId(0), Some(2), 10.600000000000001);
        q.set(StateId(3), None, 5.0);
        let run = FullRun {
            parameters: LearningParameters::default(),
            rewards: vec![(0, 1.5), (1, -0.5), (2, 0.1 * 3.0), (3, 7.0 / 3.0)],
            policy: vec!["scan".to_string()],
            policy_reward: Some(4.2 - 0.1),
            q: Some(q.entries()),
        };

        let path = temp_path("run.json");
        run.save(&path).unwrap();
        let loaded: FullRun<String> = FullRun::load(&path).unwrap().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, run);
        assert_eq!(loaded.q_table(), Some(q.clone()));
        let value = loaded.q_table().unwrap().get(StateId(0), Some(2)).unwrap();
        assert_eq!(value.to_bits(), 10.600000000000001f64.to_bits());
        for ((_, a), (_, b)) in loaded.rewards.iter().zip(&run.rewards) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let path = temp_path("corrupt.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let result = FullRun::<String>::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(Error::Json(_))));
    }
}
