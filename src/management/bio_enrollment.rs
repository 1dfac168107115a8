//! `authenticatorBioEnrollment` (CTAP2.1 §6.7): fingerprint template
//! enrollment. Surfaces only the enroll/cancel/remove/rename lifecycle,
//! not the full subcommand set (no `getFingerprintSensorInfo`,
//! `enumerateEnrollments`).

use crate::cbor::Value;
use crate::ctap2::{CommandCode, Ctap2Session};
use crate::error::Error;
use crate::pinuv::{PinToken, PinUvAuth};

mod subcommand {
    pub const ENROLL_BEGIN: u64 = 0x01;
    pub const ENROLL_CAPTURE_NEXT_SAMPLE: u64 = 0x02;
    pub const CANCEL_CURRENT_ENROLLMENT: u64 = 0x03;
    pub const REMOVE_ENROLLMENT: u64 = 0x06;
    pub const SET_FRIENDLY_NAME: u64 = 0x07;
}

const MODALITY_FINGERPRINT: u64 = 0x01;

/// Progress of an in-flight enrollment, returned after `enrollBegin` and
/// each subsequent `enrollCaptureNextSample`.
pub struct EnrollmentStep {
    pub template_id: Option<Vec<u8>>,
    pub last_sample_status: Option<u64>,
    pub remaining_samples: Option<u64>,
}

pub struct BioEnrollment<'s, 't> {
    session: &'s mut Ctap2Session<'t>,
    protocol: PinUvAuth,
    token: PinToken,
}

impl<'s, 't> BioEnrollment<'s, 't> {
    pub fn new(session: &'s mut Ctap2Session<'t>, protocol: PinUvAuth, token: PinToken) -> Self {
        Self { session, protocol, token }
    }

    fn call(&mut self, subcommand: u64, params: Option<&Value>) -> Result<Option<Value>, Error> {
        let mut message = vec![MODALITY_FINGERPRINT as u8, subcommand as u8];
        if let Some(params) = params {
            message.extend(crate::cbor::encode(params));
        }
        let pin_uv_auth_param = self.protocol.authenticate(&self.token.token, &message);

        let mut entries = vec![(1u64.into(), MODALITY_FINGERPRINT.into()), (2u64.into(), subcommand.into())];
        if let Some(params) = params {
            entries.push((3u64.into(), params.clone()));
        }
        entries.push((4u64.into(), (self.protocol.version() as u64).into()));
        entries.push((5u64.into(), Value::Bytes(pin_uv_auth_param)));

        self.session
            .call(CommandCode::BioEnrollment, Some(&Value::map(entries)))
    }

    /// `enrollBegin(timeoutMilliseconds?)`: starts a new enrollment, taking
    /// the first sample.
    pub fn enroll_begin(&mut self, timeout_milliseconds: Option<u64>) -> Result<EnrollmentStep, Error> {
        let params = timeout_milliseconds
            .map(|timeout| Value::map(vec![(3u64.into(), timeout.into())]));
        let response = self.call(subcommand::ENROLL_BEGIN, params.as_ref())?;
        Ok(enrollment_step_from_response(response.as_ref()))
    }

    /// `enrollCaptureNextSample(templateId, timeoutMilliseconds?)`.
    pub fn enroll_continue(
        &mut self,
        template_id: &[u8],
        timeout_milliseconds: Option<u64>,
    ) -> Result<EnrollmentStep, Error> {
        let mut entries = vec![(1u64.into(), Value::Bytes(template_id.to_vec()))];
        if let Some(timeout) = timeout_milliseconds {
            entries.push((3u64.into(), timeout.into()));
        }
        let response = self.call(
            subcommand::ENROLL_CAPTURE_NEXT_SAMPLE,
            Some(&Value::map(entries)),
        )?;
        Ok(enrollment_step_from_response(response.as_ref()))
    }

    pub fn enroll_cancel(&mut self) -> Result<(), Error> {
        self.call(subcommand::CANCEL_CURRENT_ENROLLMENT, None)?;
        Ok(())
    }

    pub fn remove_enrollment(&mut self, template_id: &[u8]) -> Result<(), Error> {
        let params = Value::map(vec![(
            1u64.into(),
            Value::Array(vec![Value::Bytes(template_id.to_vec())]),
        )]);
        self.call(subcommand::REMOVE_ENROLLMENT, Some(&params))?;
        Ok(())
    }

    pub fn set_friendly_name(&mut self, template_id: &[u8], friendly_name: &str) -> Result<(), Error> {
        let params = Value::map(vec![
            (1u64.into(), Value::Bytes(template_id.to_vec())),
            (2u64.into(), friendly_name.into()),
        ]);
        self.call(subcommand::SET_FRIENDLY_NAME, Some(&params))?;
        Ok(())
    }
}

fn enrollment_step_from_response(response: Option<&Value>) -> EnrollmentStep {
    let Some(response) = response else {
        return EnrollmentStep {
            template_id: None,
            last_sample_status: None,
            remaining_samples: None,
        };
    };
    EnrollmentStep {
        template_id: response
            .get_uint(4)
            .and_then(|v| v.as_bytes().ok())
            .map(<[u8]>::to_vec),
        last_sample_status: response.get_uint(5).and_then(|v| v.as_u64().ok()),
        remaining_samples: response.get_uint(6).and_then(|v| v.as_u64().ok()),
    }
}
