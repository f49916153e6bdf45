pub mod category_store;
pub mod category_tree;
pub mod cfdi;
pub mod extraction;
pub mod invoice_store;
pub mod processor;
pub mod remote_extractor;
pub mod state;
pub mod storage;
pub mod summary;
