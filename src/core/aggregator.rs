use crate::core::{ProbeOutcome, ScamEntry, Snapshot, VerifiedEntry};
use crate::utils::error::{EtlError, Result};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};

/// Folds probe outcomes into a snapshot.
///
/// Outcomes may arrive in any order; they are written into the slot of
/// their entry, and every keyed index is built in list order at `finish`.
/// When two entries share an IP or an address the later one in the list
/// wins the index slot.
pub struct Aggregator {
    scams: Vec<ScamEntry>,
    verified: Vec<VerifiedEntry>,
    checked: usize,
}

impl Aggregator {
    pub fn new(scams: Vec<ScamEntry>, verified: Vec<VerifiedEntry>) -> Self {
        Self {
            scams,
            verified,
            checked: 0,
        }
    }

    pub fn checked(&self) -> usize {
        self.checked
    }

    /// 將單一探測結果寫回對應條目
    pub fn absorb(&mut self, index: usize, outcome: ProbeOutcome) -> Result<()> {
        let entry = self
            .scams
            .get_mut(index)
            .ok_or_else(|| EtlError::ProcessingError {
                message: format!("probe outcome for unknown entry index {}", index),
            })?;

        if entry.is_probed() {
            return Err(EtlError::ProcessingError {
                message: format!("entry {} was probed twice", entry.id),
            });
        }

        entry.ip = outcome.resolved_ip;
        entry.nameservers = outcome.nameservers;
        entry.status = Some(outcome.status);
        self.checked += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<Snapshot> {
        if let Some(unprobed) = self.scams.iter().find(|entry| !entry.is_probed()) {
            return Err(EtlError::ProcessingError {
                message: format!(
                    "snapshot incomplete: entry {} has no status ({}/{} checked)",
                    unprobed.id,
                    self.checked,
                    self.scams.len()
                ),
            });
        }

        let mut blacklist = BTreeSet::new();
        let mut ips = BTreeMap::new();
        let mut addresses = BTreeMap::new();

        for entry in &self.scams {
            blacklist.extend(entry.host_forms());

            if let Some(ip) = &entry.ip {
                if let Some(previous) = ips.insert(ip.clone(), entry.clone()) {
                    tracing::debug!(
                        "IP {} shared by entries {} and {}, keeping {}",
                        ip,
                        previous.id,
                        entry.id,
                        entry.id
                    );
                }
            }

            for address in &entry.addresses {
                if let Some(previous) = addresses.insert(address.clone(), entry.clone()) {
                    tracing::debug!(
                        "Address {} listed by entries {} and {}, keeping {}",
                        address,
                        previous.id,
                        entry.id,
                        entry.id
                    );
                }
            }
        }
        blacklist.extend(ips.keys().cloned());

        let whitelist = self
            .verified
            .iter()
            .flat_map(|entry| entry.host_forms())
            .collect();

        Ok(Snapshot {
            scams: self.scams,
            verified: self.verified,
            blacklist,
            whitelist,
            addresses,
            ips,
            updated_at: Utc::now(),
        })
    }
}

/// One-shot form of `absorb` + `finish`.
pub fn fold<I>(scams: Vec<ScamEntry>, verified: Vec<VerifiedEntry>, outcomes: I) -> Result<Snapshot>
where
    I: IntoIterator<Item = (usize, ProbeOutcome)>,
{
    let mut aggregator = Aggregator::new(scams, verified);
    for (index, outcome) in outcomes {
        aggregator.absorb(index, outcome)?;
    }
    aggregator.finish()
}
