// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! The curated synonym dictionary consulted by [`crate::ServiceResolver`]
//! before fuzzy matching is attempted.
//!
//! Keys are looked up against the *normalized* form of the user's
//! phrase (lowercased, whitespace/underscore/hyphen stripped — see
//! [`crate::normalize`]), so a handful of entries below that still
//! contain spaces (e.g. `"amazon ec2"`) can never be matched; they are
//! kept anyway because the source this was ported from carries the
//! same dead entries, and removing them would be a silent behavior
//! change rather than a faithful port.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub(crate) static SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("amazoncloudwatch", "AmazonCloudWatch"),
        ("cloudwatch", "AmazonCloudWatch"),
        ("amazon cloudwatch", "AmazonCloudWatch"),
        ("amazonec2", "AmazonEC2"),
        ("ec2", "AmazonEC2"),
        ("amazon ec2", "AmazonEC2"),
        ("elastic compute cloud", "AmazonEC2"),
        ("amazons3", "AmazonS3"),
        ("s3", "AmazonS3"),
        ("amazon s3", "AmazonS3"),
        ("simple storage service", "AmazonS3"),
        ("amazonrds", "AmazonRDS"),
        ("rds", "AmazonRDS"),
        ("amazon rds", "AmazonRDS"),
        ("relational database service", "AmazonRDS"),
        ("awslambda", "AWSLambda"),
        ("lambda", "AWSLambda"),
        ("aws lambda", "AWSLambda"),
        ("amazondynamodb", "AmazonDynamoDB"),
        ("dynamodb", "AmazonDynamoDB"),
        ("amazon dynamodb", "AmazonDynamoDB"),
        ("amazoncloudfront", "AmazonCloudFront"),
        ("cloudfront", "AmazonCloudFront"),
        ("amazon cloudfront", "AmazonCloudFront"),
        ("amazonecs", "AmazonECS"),
        ("ecs", "AmazonECS"),
        ("amazon ecs", "AmazonECS"),
        ("elastic container service", "AmazonECS"),
        ("amazoneks", "AmazonEKS"),
        ("eks", "AmazonEKS"),
        ("amazon eks", "AmazonEKS"),
        ("amazonvpc", "AmazonVPC"),
        ("vpc", "AmazonVPC"),
        ("amazon vpc", "AmazonVPC"),
        ("virtual private cloud", "AmazonVPC"),
        ("amazonvirtualprivatecloud", "AmazonVPC"),
        ("amazonroute53", "AmazonRoute53"),
        ("route53", "AmazonRoute53"),
        ("route 53", "AmazonRoute53"),
        ("amazonsns", "AmazonSNS"),
        ("sns", "AmazonSNS"),
        ("simple notification service", "AmazonSNS"),
        ("amazonsqs", "AmazonSQS"),
        ("sqs", "AmazonSQS"),
        ("simple queue service", "AmazonSQS"),
        ("amazonkinesis", "AmazonKinesis"),
        ("kinesis", "AmazonKinesis"),
        ("amazonathena", "AmazonAthena"),
        ("athena", "AmazonAthena"),
        ("awsglue", "AWSGlue"),
        ("glue", "AWSGlue"),
    ]
    .into_iter()
    .collect()
});
