mod pipeline_tests;
mod service_tests;
