use std::sync::Arc;

use aws_sdk_sts::config::{BehaviorVersion, Credentials, Region};
use httpmock::Method::POST;
use httpmock::MockServer;

use crate::errors::FetchError;
use crate::sources::aws_sts::AwsStsExchangeApi;
use crate::sources::exchange::{ExchangeIdentity, ExchangeSource};
use crate::sources::FetchToken;

const STS_NAMESPACE: &str = "https://sts.amazonaws.com/doc/2011-06-15/";

fn sts_api(server: &MockServer) -> AwsStsExchangeApi {
    let config = aws_sdk_sts::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "static"))
        .endpoint_url(server.base_url())
        .build();
    AwsStsExchangeApi::from_client(aws_sdk_sts::Client::from_conf(config))
}

fn identity() -> ExchangeIdentity {
    ExchangeIdentity {
        audience: "https://partner.example".into(),
        signing_algorithm: "ES384".into(),
    }
}

#[tokio::test]
async fn sts_token_and_expiration_are_read_from_the_response() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .body_includes("Action=GetWebIdentityToken")
                .body_includes("SigningAlgorithm=ES384");
            then.status(200).header("Content-Type", "text/xml").body(format!(
                r#"<GetWebIdentityTokenResponse xmlns="{}">
  <GetWebIdentityTokenResult>
    <WebIdentityToken>sts-issued</WebIdentityToken>
    <Expiration>2031-01-01T00:00:00Z</Expiration>
  </GetWebIdentityTokenResult>
  <ResponseMetadata>
    <RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId>
  </ResponseMetadata>
</GetWebIdentityTokenResponse>"#,
                STS_NAMESPACE
            ));
        })
        .await;

    let token = ExchangeSource::new(Arc::new(sts_api(&server)), identity())
        .fetch()
        .await
        .unwrap();

    assert_eq!(token.value(), "sts-issued");
    assert_eq!(token.expiry().to_rfc3339(), "2031-01-01T00:00:00+00:00");
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn sts_rejection_is_a_transport_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(403).header("Content-Type", "text/xml").body(format!(
                r#"<ErrorResponse xmlns="{}">
  <Error>
    <Type>Sender</Type>
    <Code>AccessDenied</Code>
    <Message>not allowed to federate</Message>
  </Error>
  <RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId>
</ErrorResponse>"#,
                STS_NAMESPACE
            ));
        })
        .await;

    let err = ExchangeSource::new(Arc::new(sts_api(&server)), identity())
        .fetch()
        .await
        .unwrap_err();

    match err {
        FetchError::Transport { provider, message } => {
            assert_eq!(provider, "aws_sts");
            assert!(message.contains("AccessDenied"), "{}", message);
        }
        other => panic!("unexpected error {:?}", other),
    }
}
