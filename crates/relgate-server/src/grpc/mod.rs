mod decision_service;

pub use decision_service::DecisionServiceImpl;
