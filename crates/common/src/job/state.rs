use std::fmt;

/// States of a folder users metadata job
///
/// ```text
/// Created -> AcquiringLock -> ResolvingCertificate -> MutatingMetadata
///                 |                   |                     |
///                 |                   +--> Aborting <-------+
///                 v                           |             v
///              Finished <---------------------+   DiscoveringDescendants
///                 ^                                   |          |
///                 +-- Unlocking <-- AwaitingSubJobs <-+          |
///                        ^                                       |
///                        +---------------------------------------+
/// ```
///
/// A request that cannot be carried out goes from `Created` straight to
/// `Finished` without taking the lock.
///
/// `Unlocking` can only be reached once the job's own metadata was written.
/// Failures before that point go through `Aborting`, which gives the lock back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Created,
    AcquiringLock,
    ResolvingCertificate,
    MutatingMetadata,
    DiscoveringDescendants,
    AwaitingSubJobs,
    Unlocking,
    Aborting,
    Finished { success: bool },
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Finished { .. })
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Created, AcquiringLock)
                | (Created, Finished { success: false })
                | (Created, ResolvingCertificate)
                | (Created, MutatingMetadata)
                | (AcquiringLock, ResolvingCertificate)
                | (AcquiringLock, MutatingMetadata)
                | (AcquiringLock, Finished { success: false })
                | (ResolvingCertificate, MutatingMetadata)
                | (ResolvingCertificate, Aborting)
                | (MutatingMetadata, DiscoveringDescendants)
                | (MutatingMetadata, Aborting)
                | (DiscoveringDescendants, AwaitingSubJobs)
                | (DiscoveringDescendants, Unlocking)
                | (DiscoveringDescendants, Aborting)
                | (AwaitingSubJobs, Unlocking)
                | (Unlocking, Finished { .. })
                | (Aborting, Finished { success: false })
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Created => write!(f, "Created"),
            JobState::AcquiringLock => write!(f, "AcquiringLock"),
            JobState::ResolvingCertificate => write!(f, "ResolvingCertificate"),
            JobState::MutatingMetadata => write!(f, "MutatingMetadata"),
            JobState::DiscoveringDescendants => write!(f, "DiscoveringDescendants"),
            JobState::AwaitingSubJobs => write!(f, "AwaitingSubJobs"),
            JobState::Unlocking => write!(f, "Unlocking"),
            JobState::Aborting => write!(f, "Aborting"),
            JobState::Finished { success: true } => write!(f, "Finished(success)"),
            JobState::Finished { success: false } => write!(f, "Finished(failure)"),
        }
    }
}
