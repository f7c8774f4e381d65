pub(crate) mod mem_ledger;

pub(crate) mod partition;
