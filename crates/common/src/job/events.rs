use super::state::JobState;

/// Notifications emitted by a running job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    StateChanged {
        path: String,
        state: JobState,
    },
    /// The certificate of the user being added is known
    CertificateReady {
        user_id: String,
        fingerprint: String,
    },
    /// The job released the folder lock
    FolderUnlocked {
        path: String,
    },
    /// Terminal notification, sent exactly once
    Finished {
        path: String,
        code: u16,
        message: String,
    },
}

#[derive(Debug, Default)]
pub(crate) struct EventEmitter {
    subscribers: Vec<flume::Sender<JobEvent>>,
}

impl EventEmitter {
    pub fn subscribe(&mut self) -> flume::Receiver<JobEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&self, event: JobEvent) {
        // a dropped receiver just means nobody is listening anymore
        for tx in &self.subscribers {
            let _ = tx.send(event.clone());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_every_subscriber_receives_events() {
        let mut emitter = EventEmitter::default();
        let first = emitter.subscribe();
        let second = emitter.subscribe();
        let dropped = emitter.subscribe();
        drop(dropped);

        emitter.emit(JobEvent::FolderUnlocked {
            path: "/enc".to_string(),
        });

        let expected = JobEvent::FolderUnlocked {
            path: "/enc".to_string(),
        };
        assert_eq!(first.try_recv().unwrap(), expected);
        assert_eq!(second.try_recv().unwrap(), expected);
    }
}
