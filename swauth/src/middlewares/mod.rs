pub mod s3_detect;
