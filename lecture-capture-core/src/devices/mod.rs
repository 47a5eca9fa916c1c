pub mod device_catalog;
