pub mod batch_provisioner;
pub mod renewal_recovery;
pub mod status_sync;
