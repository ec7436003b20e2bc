use super::test_helpers::*;
use super::*;
use crate::types::{Event, Status, TaskOptions};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
