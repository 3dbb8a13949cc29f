use tonic_health::pb::health_server::HealthServer;

use crate::proto::relgate::v1::decision_service_server::DecisionServiceServer;
use crate::service::Backend;

/// Health service reporting the decision service (and the overall server)
/// as serving.
pub async fn create_health_service<B: Backend>()
-> HealthServer<impl tonic_health::pb::health_server::Health> {
    let (mut reporter, service) = tonic_health::server::health_reporter();
    reporter
        .set_serving::<DecisionServiceServer<crate::grpc::DecisionServiceImpl<B>>>()
        .await;
    reporter.set_service_status("", tonic_health::ServingStatus::Serving).await;
    service
}
