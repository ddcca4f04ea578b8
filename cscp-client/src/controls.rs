//! Typed console controls on top of [`Client::query`] and [`Client::write`].
//!
//! Fader and main ids are 1-based. They are validated against the console's
//! reported counts, or the configured ones before initialization.
use cscp_protocol::{
    Assignment, Command, ConsoleInfo, MAX_LEVEL, Request, Response, Shape, StereoImage, level,
    request::MAX_ROUTES,
};

use crate::{
    Client,
    error::{ClientError, Result, check_range},
};

fn unexpected(command: Command) -> ClientError {
    ClientError::UnexpectedResponse {
        command: command.name(),
    }
}

fn check_level(level: u16) -> Result<()> {
    check_range("level", level.into(), 0, MAX_LEVEL.into())
}

fn check_db(db: f64) -> Result<()> {
    if db.is_finite() {
        Ok(())
    } else {
        Err(ClientError::InvalidArgument(format!("{} is not a level in dB", db)))
    }
}

/// Labels are plain ASCII and must fit the command's field.
fn check_label(command: Command, label: &str) -> Result<()> {
    let width = match command.shape() {
        Shape::Label { width, .. } => width,
        _ => return Err(unexpected(command)),
    };
    if !label.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err(ClientError::InvalidArgument(format!(
            "label '{}' contains non-ASCII or control characters",
            label
        )));
    }
    if label.len() > width {
        return Err(ClientError::InvalidArgument(format!(
            "label '{}' is longer than {} characters",
            label, width
        )));
    }
    Ok(())
}

impl Client {
    fn max_faders(&self) -> u16 {
        match self.console() {
            Some(info) => info.max_faders(),
            None => self.config().max_fader_count,
        }
    }

    fn max_mains(&self) -> u16 {
        match self.console() {
            Some(info) => info.max_mains(),
            None => self.config().max_main_count,
        }
    }

    fn check_fader(&self, fader: u16) -> Result<()> {
        check_range("fader", fader.into(), 1, self.max_faders().into())
    }

    fn check_main(&self, main: u16) -> Result<()> {
        check_range("main", main.into(), 1, self.max_mains().into())
    }

    async fn query_fader(&self, command: Command, fader: u16) -> Result<Response> {
        self.check_fader(fader)?;
        self.query(Request::query_entity(command, fader)).await
    }

    async fn query_main(&self, command: Command, main: u16) -> Result<Response> {
        self.check_main(main)?;
        self.query(Request::query_entity(command, main)).await
    }

    pub async fn fader_level(&self, fader: u16) -> Result<u16> {
        match self.query_fader(Command::FaderLevel, fader).await? {
            Response::FaderLevel { level, .. } => Ok(level),
            _ => Err(unexpected(Command::FaderLevel)),
        }
    }

    pub async fn set_fader_level(&self, fader: u16, level: u16) -> Result<()> {
        self.check_fader(fader)?;
        check_level(level)?;
        self.write(Request::set_level(Command::FaderLevel, fader, level))
            .await
    }

    /// Reads a fader level converted to dB.
    pub async fn fader_level_db(&self, fader: u16) -> Result<f64> {
        Ok(level::channel_level_to_db(self.fader_level(fader).await?))
    }

    /// Sets a fader level in dB, clamped to the fader's range of -100 to +10 dB.
    pub async fn set_fader_level_db(&self, fader: u16, db: f64) -> Result<()> {
        check_db(db)?;
        self.set_fader_level(fader, level::db_to_channel_level(db))
            .await
    }

    /// Whether the fader is cut (muted).
    pub async fn fader_cut(&self, fader: u16) -> Result<bool> {
        match self.query_fader(Command::FaderCut, fader).await? {
            Response::FaderCut { cut, .. } => Ok(cut),
            _ => Err(unexpected(Command::FaderCut)),
        }
    }

    pub async fn set_fader_cut(&self, fader: u16, cut: bool) -> Result<()> {
        self.check_fader(fader)?;
        self.write(Request::set_flag(Command::FaderCut, fader, cut))
            .await
    }

    pub async fn fader_pfl(&self, fader: u16) -> Result<bool> {
        match self.query_fader(Command::FaderPfl, fader).await? {
            Response::FaderPfl { on, .. } => Ok(on),
            _ => Err(unexpected(Command::FaderPfl)),
        }
    }

    pub async fn set_fader_pfl(&self, fader: u16, on: bool) -> Result<()> {
        self.check_fader(fader)?;
        self.write(Request::set_flag(Command::FaderPfl, fader, on))
            .await
    }

    pub async fn fader_label(&self, fader: u16) -> Result<String> {
        match self.query_fader(Command::FaderLabel, fader).await? {
            Response::FaderLabel { label, .. } => Ok(label),
            _ => Err(unexpected(Command::FaderLabel)),
        }
    }

    pub async fn set_fader_label(&self, fader: u16, label: &str) -> Result<()> {
        self.check_fader(fader)?;
        check_label(Command::FaderLabel, label)?;
        self.write(Request::set_label(Command::FaderLabel, fader, label))
            .await
    }

    pub async fn main_level(&self, main: u16) -> Result<u16> {
        match self.query_main(Command::MainLevel, main).await? {
            Response::MainLevel { level, .. } => Ok(level),
            _ => Err(unexpected(Command::MainLevel)),
        }
    }

    pub async fn set_main_level(&self, main: u16, level: u16) -> Result<()> {
        self.check_main(main)?;
        check_level(level)?;
        self.write(Request::set_level(Command::MainLevel, main, level))
            .await
    }

    pub async fn main_level_db(&self, main: u16) -> Result<f64> {
        Ok(level::main_level_to_db(self.main_level(main).await?))
    }

    /// Sets a main level in dB, clamped to the main's range of -100 to 0 dB.
    pub async fn set_main_level_db(&self, main: u16, db: f64) -> Result<()> {
        check_db(db)?;
        self.set_main_level(main, level::db_to_main_level(db)).await
    }

    pub async fn main_pfl(&self, main: u16) -> Result<bool> {
        match self.query_main(Command::MainPfl, main).await? {
            Response::MainPfl { on, .. } => Ok(on),
            _ => Err(unexpected(Command::MainPfl)),
        }
    }

    pub async fn set_main_pfl(&self, main: u16, on: bool) -> Result<()> {
        self.check_main(main)?;
        self.write(Request::set_flag(Command::MainPfl, main, on))
            .await
    }

    pub async fn main_label(&self, main: u16) -> Result<String> {
        match self.query_main(Command::MainLabel, main).await? {
            Response::MainLabel { label, .. } => Ok(label),
            _ => Err(unexpected(Command::MainLabel)),
        }
    }

    pub async fn set_main_label(&self, main: u16, label: &str) -> Result<()> {
        self.check_main(main)?;
        check_label(Command::MainLabel, label)?;
        self.write(Request::set_label(Command::MainLabel, main, label))
            .await
    }

    /// Asks the console for its info record. Unlike [`Client::console`], this
    /// always goes to the wire.
    pub async fn query_console_info(&self) -> Result<ConsoleInfo> {
        match self.query(Request::query(Command::ConsoleInfo)).await? {
            Response::ConsoleInfo(info) => Ok(info),
            _ => Err(unexpected(Command::ConsoleInfo)),
        }
    }

    pub async fn console_name(&self) -> Result<String> {
        match self.query(Request::query(Command::ConsoleName)).await? {
            Response::ConsoleName(name) => Ok(name),
            _ => Err(unexpected(Command::ConsoleName)),
        }
    }

    pub async fn fader_assignment(&self, fader: u16) -> Result<Assignment> {
        match self.query_fader(Command::FaderAssignment, fader).await? {
            Response::FaderAssignment(assignment) => Ok(assignment),
            _ => Err(unexpected(Command::FaderAssignment)),
        }
    }

    /// Which aux outputs exist on the console, one flag per aux.
    pub async fn available_aux(&self) -> Result<Vec<bool>> {
        match self.query(Request::query(Command::AvailableAux)).await? {
            Response::AvailableAux(available) => Ok(available),
            _ => Err(unexpected(Command::AvailableAux)),
        }
    }

    /// Aux sends of a fader, truncated to `count` entries.
    pub async fn aux_routing(&self, fader: u16, count: usize) -> Result<Vec<bool>> {
        match self.query_fader(Command::AuxRouting, fader).await? {
            Response::AuxRouting { mut routes, .. } => {
                routes.truncate(count);
                Ok(routes)
            }
            _ => Err(unexpected(Command::AuxRouting)),
        }
    }

    pub async fn set_aux_routing(&self, fader: u16, routes: &[bool]) -> Result<()> {
        self.check_fader(fader)?;
        check_range("aux count", routes.len() as i64, 0, MAX_ROUTES as i64)?;
        self.write(Request::set_routing(Command::AuxRouting, fader, routes))
            .await
    }

    pub async fn available_mains(&self) -> Result<Vec<bool>> {
        match self.query(Request::query(Command::AvailableMains)).await? {
            Response::AvailableMains(available) => Ok(available),
            _ => Err(unexpected(Command::AvailableMains)),
        }
    }

    /// Main outputs a fader feeds, truncated to the console's main count.
    pub async fn main_routing(&self, fader: u16) -> Result<Vec<bool>> {
        let mains = self.max_mains().into();
        match self.query_fader(Command::MainRouting, fader).await? {
            Response::MainRouting { mut routes, .. } => {
                routes.truncate(mains);
                Ok(routes)
            }
            _ => Err(unexpected(Command::MainRouting)),
        }
    }

    pub async fn set_main_routing(&self, fader: u16, routes: &[bool]) -> Result<()> {
        self.check_fader(fader)?;
        check_range(
            "main count",
            routes.len() as i64,
            0,
            self.max_mains().into(),
        )?;
        self.write(Request::set_routing(Command::MainRouting, fader, routes))
            .await
    }

    pub async fn stereo_image(&self, fader: u16) -> Result<StereoImage> {
        match self.query_fader(Command::StereoImage, fader).await? {
            Response::StereoImage { image, .. } => Ok(image),
            _ => Err(unexpected(Command::StereoImage)),
        }
    }

    pub async fn set_stereo_image(&self, fader: u16, image: StereoImage) -> Result<()> {
        self.check_fader(fader)?;
        self.write(Request::set_stereo_image(fader, image)).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn labels_must_fit_and_be_ascii() {
        assert!(check_label(Command::FaderLabel, "VOX 1").is_ok());
        assert!(check_label(Command::FaderLabel, "12345678").is_ok());
        assert!(matches!(
            check_label(Command::FaderLabel, "123456789"),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            check_label(Command::MainLabel, "Müsik"),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(check_label(Command::ConsoleName, "A desk with a long name").is_ok());
    }

    #[test]
    fn levels_are_bounded() {
        assert!(check_level(0).is_ok());
        assert!(check_level(1023).is_ok());
        assert!(matches!(
            check_level(1024),
            Err(ClientError::OutOfRange { field: "level", value: 1024, .. })
        ));
        assert!(check_db(f64::NAN).is_err());
        assert!(check_db(-200.0).is_ok());
    }
}
