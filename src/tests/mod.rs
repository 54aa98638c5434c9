#[cfg(feature = "aws-sts")]
mod aws_sts_exchange;
mod common;
mod config_loading;
