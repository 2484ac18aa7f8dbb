use chrono::{DateTime, Utc};

use crate::analytics::CampaignAnalyticsBody;
use crate::campaign::manager::{CampaignUpdate, NewCampaign};
use crate::campaign::{CampaignBody, CampaignId, FailCampaignBody, ScheduleCampaignBody};
use crate::message::manager::EnqueueRequest;
use crate::message::{EnqueueSummaryBody, MessageBody};
use crate::variant::manager::NewVariant;
use crate::variant::VariantBody;

use super::{ApiClient, ApiResponse};

pub struct CampaignApiService<'a> {
    client: &'a ApiClient,
}

impl<'a> CampaignApiService<'a> {
    pub fn new(client: &'a ApiClient) -> CampaignApiService<'a> {
        CampaignApiService { client }
    }

    pub async fn create_campaign(&self, campaign: &NewCampaign) -> ApiResponse<CampaignBody> {
        self.client.post("/campaigns", campaign).await
    }

    pub async fn get_campaigns(&self) -> ApiResponse<Vec<CampaignBody>> {
        self.client.get("/campaigns").await
    }

    pub async fn get_campaign(&self, campaign_id: CampaignId) -> ApiResponse<CampaignBody> {
        self.client.get(&format!("/campaigns/{}", campaign_id)).await
    }

    pub async fn update_campaign(
        &self,
        campaign_id: CampaignId,
        update: &CampaignUpdate,
    ) -> ApiResponse<CampaignBody> {
        self.client
            .put(&format!("/campaigns/{}", campaign_id), update)
            .await
    }

    pub async fn delete_campaign(&self, campaign_id: CampaignId) -> ApiResponse<()> {
        self.client
            .delete(&format!("/campaigns/{}", campaign_id))
            .await
    }

    pub async fn schedule_campaign(
        &self,
        campaign_id: CampaignId,
        send_at: Option<DateTime<Utc>>,
    ) -> ApiResponse<CampaignBody> {
        self.client
            .post(
                &format!("/campaigns/{}/schedule", campaign_id),
                &ScheduleCampaignBody { send_at },
            )
            .await
    }

    pub async fn unschedule_campaign(&self, campaign_id: CampaignId) -> ApiResponse<CampaignBody> {
        self.transition(campaign_id, "unschedule").await
    }

    pub async fn start_campaign(&self, campaign_id: CampaignId) -> ApiResponse<CampaignBody> {
        self.transition(campaign_id, "start").await
    }

    pub async fn pause_campaign(&self, campaign_id: CampaignId) -> ApiResponse<CampaignBody> {
        self.transition(campaign_id, "pause").await
    }

    pub async fn resume_campaign(&self, campaign_id: CampaignId) -> ApiResponse<CampaignBody> {
        self.transition(campaign_id, "resume").await
    }

    pub async fn complete_campaign(&self, campaign_id: CampaignId) -> ApiResponse<CampaignBody> {
        self.transition(campaign_id, "complete").await
    }

    pub async fn cancel_campaign(&self, campaign_id: CampaignId) -> ApiResponse<CampaignBody> {
        self.transition(campaign_id, "cancel").await
    }

    pub async fn fail_campaign(
        &self,
        campaign_id: CampaignId,
        reason: &str,
    ) -> ApiResponse<CampaignBody> {
        let body = FailCampaignBody {
            reason: reason.to_string(),
        };

        self.client
            .post(&format!("/campaigns/{}/fail", campaign_id), &body)
            .await
    }

    pub async fn get_analytics(&self, campaign_id: CampaignId) -> ApiResponse<CampaignAnalyticsBody> {
        self.client
            .get(&format!("/campaigns/{}/analytics", campaign_id))
            .await
    }

    pub async fn create_variant(
        &self,
        campaign_id: CampaignId,
        variant: &NewVariant,
    ) -> ApiResponse<VariantBody> {
        self.client
            .post(&format!("/campaigns/{}/variants", campaign_id), variant)
            .await
    }

    pub async fn get_variants(&self, campaign_id: CampaignId) -> ApiResponse<Vec<VariantBody>> {
        self.client
            .get(&format!("/campaigns/{}/variants", campaign_id))
            .await
    }

    pub async fn enqueue_messages(
        &self,
        campaign_id: CampaignId,
        request: &EnqueueRequest,
    ) -> ApiResponse<EnqueueSummaryBody> {
        self.client
            .post(&format!("/campaigns/{}/messages", campaign_id), request)
            .await
    }

    pub async fn get_messages(&self, campaign_id: CampaignId) -> ApiResponse<Vec<MessageBody>> {
        self.client
            .get(&format!("/campaigns/{}/messages", campaign_id))
            .await
    }

    async fn transition(&self, campaign_id: CampaignId, action: &str) -> ApiResponse<CampaignBody> {
        self.client
            .post_empty(&format!("/campaigns/{}/{}", campaign_id, action))
            .await
    }
}
